//! Storage capability supporting persistence during power-off which must be implemented by calling code.

use core::fmt::Debug;

/// Storage for one session snapshot
pub trait NonVolatileStore {
    /// Error type for storage operations
    #[cfg(feature = "defmt")]
    type Error: Debug + defmt::Format;

    /// Error type for storage operations
    #[cfg(not(feature = "defmt"))]
    type Error: Debug;

    /// Replace the stored snapshot with `data`
    fn save(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Copy the stored snapshot into `buf`, returning its length
    ///
    /// `Ok(None)` when nothing is stored.
    fn load(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error>;

    /// Erase the stored snapshot
    fn clear(&mut self) -> Result<(), Self::Error>;
}
