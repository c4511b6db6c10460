//! Row types for the market tables.

/// Serialize a `#[repr(i32)]` status enum as its integer discriminant.
macro_rules! serialize_as_i32 {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_i32(*self as i32)
            }
        }
    };
}

pub(crate) use serialize_as_i32;

pub mod market;
pub mod moderation;
pub mod notice;
