use crate::bus::I2cBus;
use crate::error::Result;

/// Abstracts bus creation from a connection string.
///
/// Implementors define which connection strings they claim and how to reach
/// the hardware behind them.
pub trait BusFactory {
    /// Unique backend name, also the scheme of its connection strings.
    fn name(&self) -> &str;

    /// Try to create a bus.
    ///
    /// * `Ok(None)`: the string is not for this backend, or `uri` is `None`
    ///   and no default device was found. Nothing may have been acquired.
    /// * `Err(_)`: the string is for this backend but is malformed, or the
    ///   connection failed. Everything acquired so far must be released.
    ///
    /// With `uri == None` the backend attempts zero-configuration discovery.
    fn create(&self, uri: Option<&str>) -> Result<Option<Box<dyn I2cBus>>>;
}
