use std::{fmt::Display, io::Cursor, str::FromStr};

use bigdecimal::{
    num_bigint::{BigInt, BigUint, Sign},
    BigDecimal, ParseBigDecimalError,
};
use byteorder::{BigEndian, ReadBytesExt};
use tokio_postgres::types::{FromSql, Type};

const NUMERIC_SIGN_POSITIVE: u16 = 0x0000;
const NUMERIC_SIGN_NEGATIVE: u16 = 0x4000;
const NUMERIC_SIGN_NAN: u16 = 0xC000;

/// The full range of Postgres `numeric`, including `NaN`, which has no
/// [`BigDecimal`] representation and is carried as `None`.
#[derive(Debug, Default, Ord, PartialOrd, Eq, PartialEq, Clone)]
pub struct PgNumeric {
    pub n: Option<BigDecimal>,
}

impl PgNumeric {
    pub fn new(n: Option<BigDecimal>) -> Self {
        Self { n }
    }

    pub fn is_nan(&self) -> bool {
        self.n.is_none()
    }
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + 'static + Sync + Send>> {
        let mut rdr = Cursor::new(raw);

        let n_digits = rdr.read_u16::<BigEndian>()?;
        let weight = rdr.read_i16::<BigEndian>()?;
        let sign = match rdr.read_u16::<BigEndian>()? {
            NUMERIC_SIGN_NEGATIVE => Sign::Minus,
            NUMERIC_SIGN_POSITIVE => Sign::Plus,
            NUMERIC_SIGN_NAN => return Ok(Self { n: None }),
            _ => {
                return Err(
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "bad numeric sign").into(),
                )
            }
        };
        let scale = rdr.read_u16::<BigEndian>()?;

        // base-10000 digits, most significant first
        let mut magnitude = BigUint::from(0u32);
        for n in (0..n_digits).rev() {
            let digit = rdr.read_u16::<BigEndian>()?;
            magnitude += BigUint::from(digit) * BigUint::from(10_000u32).pow(n as u32);
        }

        // the leading digit currently carries factor 10000^(n_digits - 1)
        // but the wire weight says it should carry 10000^weight
        let correction_exp = 4 * (i64::from(weight) - i64::from(n_digits) + 1);
        let value = BigDecimal::new(BigInt::from_biguint(sign, magnitude), -correction_exp)
            .with_scale(i64::from(scale));

        Ok(Self { n: Some(value) })
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::NUMERIC)
    }
}

impl FromStr for PgNumeric {
    type Err = ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("nan") {
            return Ok(Self { n: None });
        }
        Ok(Self {
            n: Some(s.parse()?),
        })
    }
}

impl Display for PgNumeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.n {
            Some(ref n) => write!(f, "{n}"),
            None => write!(f, "NaN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(n_digits: u16, weight: i16, sign: u16, scale: u16, digits: &[u16]) -> Vec<u8> {
        let mut buf = Vec::new();
        for half in [n_digits, weight as u16, sign, scale] {
            buf.extend_from_slice(&half.to_be_bytes());
        }
        for d in digits {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        buf
    }

    #[test]
    fn decodes_small_integers() {
        let raw = wire(1, 0, NUMERIC_SIGN_POSITIVE, 0, &[42]);
        let n = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert_eq!(n.to_string(), "42");
    }

    #[test]
    fn decodes_negative_fractions() {
        // -1.5 = digits [1, 5000], weight 0, scale 1
        let raw = wire(2, 0, NUMERIC_SIGN_NEGATIVE, 1, &[1, 5000]);
        let n = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert_eq!(n.to_string(), "-1.5");
    }

    #[test]
    fn decodes_nan() {
        let raw = wire(0, 0, NUMERIC_SIGN_NAN, 0, &[]);
        let n = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert!(n.is_nan());
        assert_eq!(n.to_string(), "NaN");
    }

    #[test]
    fn parses_text_form() {
        let n: PgNumeric = "123.456".parse().unwrap();
        assert_eq!(n.to_string(), "123.456");
        let nan: PgNumeric = "NaN".parse().unwrap();
        assert!(nan.is_nan());
        assert!("not-a-number".parse::<PgNumeric>().is_err());
    }
}
