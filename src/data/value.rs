// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// An opaque, immutable leaf value.
///
/// The tree store never interprets these beyond equality, hashing and ordering: type
/// canonicalisation is the job of whoever produces the data. Values appear as leaf payloads,
/// as leaf-set entry identities, and as key values of keyed list entries.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Value {
    Bytes(#[cfg_attr(feature = "serde", serde(with = "serde_bytes"))] Vec<u8>),
    String(String),
    Double(f64),
    U64(u64),
    I64(i64),
    Bool(bool),
    #[cfg(feature = "chrono")]
    Timestamp(chrono::DateTime<chrono::Utc>),
    #[cfg(feature = "ulid")]
    Ulid(ulid::Ulid),
}

impl Value {
    /// Ordering between values of different variants.
    const fn comparison_order(&self) -> usize {
        match self {
            Value::Bytes(_) => 7,
            Value::String(_) => 6,
            #[cfg(feature = "ulid")]
            Value::Ulid(_) => 5,
            #[cfg(feature = "chrono")]
            Value::Timestamp(_) => 4,
            Value::Double(_) => 3,
            Value::U64(_) => 2,
            Value::I64(_) => 1,
            Value::Bool(_) => 0,
        }
    }

    /// Returns the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! impl_from {
(
    $(
        $source:ty => $target:ident $(with $conv:ident)?
    ),* $(,)?
    ) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Self::$target(impl_from!(value$(, $conv)?))
                }
            }
        )*
    };

    ($value:ident, $conv:ident) => {
        $value.$conv()
    };

    ($value:ident) => {
        $value
    };
}

impl_from!(
    &[u8]      => Bytes with into,
    Vec<u8>    => Bytes,
    String     => String,
    &str       => String with to_string,
    f64        => Double,
    u8         => U64 with into,
    u16        => U64 with into,
    u32        => U64 with into,
    u64        => U64,
    i8         => I64 with into,
    i16        => I64 with into,
    i32        => I64 with into,
    i64        => I64,
    bool       => Bool,
);

#[cfg(feature = "chrono")]
impl From<chrono::DateTime<chrono::Utc>> for Value {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Self::Timestamp(value)
    }
}

#[cfg(feature = "ulid")]
impl From<ulid::Ulid> for Value {
    fn from(value: ulid::Ulid) -> Self {
        Self::Ulid(value)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(inner) => write!(f, "{inner:02X?}"),
            Self::String(inner) => inner.fmt(f),
            Self::Bool(inner) => inner.fmt(f),
            // {:?} always prints a decimal point, which keeps doubles apart from integers
            Self::Double(inner) => write!(f, "{inner:?}d"),
            Self::U64(inner) => write!(f, "{inner}u"),
            Self::I64(inner) => write!(f, "{inner}"),
            #[cfg(feature = "chrono")]
            Self::Timestamp(inner) => write!(f, "{}", inner.to_rfc3339()),
            #[cfg(feature = "ulid")]
            Self::Ulid(inner) => inner.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(inner) => f.write_str(inner),
            Self::Double(inner) => inner.fmt(f),
            Self::U64(inner) => inner.fmt(f),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparison_order().hash(state);
        match self {
            Self::Bytes(b) => b.hash(state),
            Self::String(s) => s.hash(state),
            // consistent with total_cmp equality, which is bitwise
            Self::Double(d) => d.to_bits().hash(state),
            Self::U64(u) => u.hash(state),
            Self::I64(i) => i.hash(state),
            Self::Bool(b) => b.hash(state),
            #[cfg(feature = "chrono")]
            Self::Timestamp(t) => t.hash(state),
            #[cfg(feature = "ulid")]
            Self::Ulid(u) => u.hash(state),
        }
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        matches!(self, Self::String(s) if s == other)
    }
}
impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Self::String(s) if s == other)
    }
}
impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, Self::Bool(b) if b == other)
    }
}
impl PartialEq<u64> for Value {
    fn eq(&self, other: &u64) -> bool {
        match self {
            Self::U64(u) => u == other,
            Self::I64(i) => u64::try_from(*i).is_ok_and(|u| &u == other),
            _ => false,
        }
    }
}
// i32 because it's the "default" inference integer type
impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        match self {
            Self::U64(u) => i32::try_from(*u).is_ok_and(|i| &i == other),
            Self::I64(i) => i32::try_from(*i).is_ok_and(|i| &i == other),
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Bytes(b1), Bytes(b2)) => b1.cmp(b2),
            (String(s1), String(s2)) => s1.cmp(s2),
            (Double(d1), Double(d2)) => d1.total_cmp(d2),
            (U64(u1), U64(u2)) => u1.cmp(u2),
            (I64(i1), I64(i2)) => i1.cmp(i2),
            (Bool(b1), Bool(b2)) => b1.cmp(b2),
            #[cfg(feature = "chrono")]
            (Timestamp(t1), Timestamp(t2)) => t1.cmp(t2),
            #[cfg(feature = "ulid")]
            (Ulid(u1), Ulid(u2)) => u1.cmp(u2),
            (a, b) => {
                let a_order = a.comparison_order();
                let b_order = b.comparison_order();
                debug_assert_ne!(
                    a_order, b_order,
                    "match must handle all comparisons between similar variants"
                );
                a_order.cmp(&b_order)
            }
        }
    }
}

#[cfg(any(test, feature = "arbitrary"))]
impl quickcheck::Arbitrary for Value {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        match u8::arbitrary(g) % 6 {
            0 => Value::Bytes(Vec::arbitrary(g)),
            1 => Value::String(String::arbitrary(g)),
            2 => Value::Double(f64::arbitrary(g)),
            3 => Value::U64(u64::arbitrary(g)),
            4 => Value::I64(i64::arbitrary(g)),
            _ => Value::Bool(bool::arbitrary(g)),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match self {
            Value::Bytes(b) => Box::new(b.shrink().map(Value::Bytes)),
            Value::String(s) => Box::new(s.shrink().map(Value::String)),
            Value::U64(u) => Box::new(u.shrink().map(Value::U64)),
            Value::I64(i) => Box::new(i.shrink().map(Value::I64)),
            _ => quickcheck::empty_shrinker(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[quickcheck]
    fn equal_values_hash_equally(v: Value) -> bool {
        let copy = v.clone();
        copy == v && hash_of(&copy) == hash_of(&v)
    }

    #[test]
    fn doubles_compare_by_total_order() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
    }

    #[test]
    fn cross_variant_order_is_stable() {
        assert!(Value::from("a") > Value::from(5u64));
        assert!(Value::from(5u64) > Value::from(-3));
        assert!(Value::from(-3) > Value::from(true));
    }

    #[test]
    fn debug_tells_numbers_apart() {
        assert_eq!(format!("{:?}", Value::from(1u64)), "1u");
        assert_eq!(format!("{:?}", Value::from(1i64)), "1");
        assert_eq!(format!("{:?}", Value::from(1.0)), "1.0d");
        assert_eq!(Value::from("x").to_string(), "x");
    }
}
