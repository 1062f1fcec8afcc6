use core::fmt::Debug;

/// Random number source for join retry jitter
pub trait Rng {
    /// Error type for random number generation
    #[cfg(feature = "defmt")]
    type Error: Debug + defmt::Format;

    /// Error type for random number generation
    #[cfg(not(feature = "defmt"))]
    type Error: Debug;

    /// Next random value
    fn next_u32(&mut self) -> Result<u32, Self::Error>;
}
