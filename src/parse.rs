//! Parsers using [nom](https://crates.io/crates/nom).

use nom::{
    error::ParseError,
    number::complete::{be_u16, be_u32},
    IResult,
};

/// Reads 2 bytes if the first byte's top bit is clear, 4 bytes otherwise.
///
/// The wide form carries its payload in the low 31 bits.
///
/// # Errors
///
/// Parser can reach EOF early if not enough bytes are supplied.
///
/// # Example
///
/// ```
/// use js5fs::parse::be_u32_smart;
///
/// # fn main() -> js5fs::Result<()> {
/// let buffer = &[255, 54, 2, 0, 62, 1, 42, 233];
///
/// let (buffer, value1) = be_u32_smart(buffer)?;
/// let (buffer, value2) = be_u32_smart(buffer)?;
///
/// assert_eq!(value1, 2134245888);
/// assert_eq!(value2, 15873);
/// assert_eq!(buffer, &[42, 233]);
/// # Ok(())
/// # }
/// ```
#[inline]
pub fn be_u32_smart<'a, E: ParseError<&'a [u8]>>(buffer: &'a [u8]) -> IResult<&'a [u8], u32, E> {
    if (buffer[0] ^ 0xff) as i8 <= -1 {
        let (buffer, value) = be_u16(buffer)?;
        Ok((buffer, value as u32))
    } else {
        let (buffer, value) = be_u32(buffer)?;
        Ok((buffer, value & 0x7fff_ffff))
    }
}

/// Writes the inverse of [`be_u32_smart`]: 2 bytes below `0x8000`, otherwise
/// 4 bytes with the top bit set.
///
/// Values above `0x7FFF_FFFF` do not fit the wide form.
#[inline]
pub fn put_u32_smart(buffer: &mut Vec<u8>, value: u32) {
    debug_assert!(value <= 0x7fff_ffff);

    if value < 0x8000 {
        buffer.extend(&(value as u16).to_be_bytes());
    } else {
        buffer.extend(&(value | 0x8000_0000).to_be_bytes());
    }
}
