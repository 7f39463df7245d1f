use alloy_primitives::U256;
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;
use std::io;
use std::str::FromStr;

use super::TypesError;

/// Arbitrary-precision unsigned amount, rendered in base units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency(pub U256);

impl Currency {
    pub const ZERO: Self = Self(U256::ZERO);

    pub fn from_u64(v: u64) -> Self {
        Self(U256::from(v))
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Sums an iterator of amounts, `None` on overflow.
    pub fn sum<'a>(values: impl IntoIterator<Item = &'a Currency>) -> Option<Self> {
        values.into_iter().try_fold(Self::ZERO, |acc, v| acc.checked_add(*v))
    }
}

impl From<u64> for Currency {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = TypesError;

    /// Decimal digits only; no sign, no prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypesError::InvalidAmount(s.to_string()));
        }
        U256::from_str_radix(s, 10)
            .map(Self)
            .map_err(|e| TypesError::InvalidAmount(format!("{s}: {e}")))
    }
}

impl BorshSerialize for Currency {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0.to_be_bytes::<32>())
    }
}

impl BorshDeserialize for Currency {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 32];
        reader.read_exact(&mut buf)?;
        Ok(Self(U256::from_be_bytes(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_only() {
        assert_eq!("10".parse::<Currency>().unwrap(), Currency::from(10));
        assert!("-5".parse::<Currency>().is_err());
        assert!("0x10".parse::<Currency>().is_err());
        assert!("".parse::<Currency>().is_err());
    }

    #[test]
    fn large_values_survive_borsh() {
        let big: Currency = "300000000000000000000000000000".parse().unwrap();
        let bytes = borsh::to_vec(&big).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(Currency::try_from_slice(&bytes).unwrap(), big);
        assert_eq!(big.to_string(), "300000000000000000000000000000");
    }

    #[test]
    fn borsh_bytes_are_big_endian() {
        let bytes = borsh::to_vec(&Currency::from(0x0102)).unwrap();
        assert_eq!(&bytes[30..], &[0x01, 0x02]);
        assert!(bytes[..30].iter().all(|b| *b == 0));
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(Currency::from(3).checked_sub(Currency::from(5)), None);
        assert_eq!(
            Currency::sum(&[Currency::from(2), Currency::from(3)]),
            Some(Currency::from(5))
        );
    }
}
