//! Helpful utility functions.

/// Name hashing as the reference tables expect it.
pub mod djb2 {
    /// Hashes the name into the 32-bit identifier used by the reference
    /// table name lookup.
    ///
    /// Classic djb2 folding, except the accumulator starts at 0 instead
    /// of 5381. Arithmetic wraps; long names overflow by design.
    ///
    /// # Example
    ///
    /// ```
    /// use js5fs::util::djb2;
    ///
    /// assert_eq!(djb2::hash(""), 0);
    /// assert_eq!(djb2::hash("a"), 97);
    /// ```
    #[inline]
    pub fn hash<T: AsRef<str>>(name: T) -> i32 {
        name.as_ref().chars().fold(0_i32, |hash, c| {
            (c as i32).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash))
        })
    }
}
