//! The target contract: a single capability for "contribute my canonical
//! bytes to this buffer."
//!
//! An `Owid<T>` holds a non-owning reference — or an owned value, if the
//! caller prefers — of its target; the target never owns its OWID. Targets
//! choose their own framing; OWID only guarantees it calls
//! [`Target::add_owid_data`] first, before its own version/domain/timestamp
//! fields, per the normative ordering in §4.4.

use crate::error::Result;
use crate::io::Writer;

pub trait Target {
    /// Appends this target's canonical bytes to `writer`. Called as the
    /// first step of assembling the message an OWID signs or verifies.
    fn add_owid_data(&self, writer: &mut Writer) -> Result<()>;
}

impl<T: Target + ?Sized> Target for Box<T> {
    fn add_owid_data(&self, writer: &mut Writer) -> Result<()> {
        (**self).add_owid_data(writer)
    }
}

impl<T: Target + ?Sized> Target for &T {
    fn add_owid_data(&self, writer: &mut Writer) -> Result<()> {
        (**self).add_owid_data(writer)
    }
}

/// A type-erased target for callers who need heterogeneous collections of
/// OWIDs over different payload shapes, at the cost of a vtable dispatch.
pub type AnyTarget = Box<dyn Target + Send + Sync>;

/// The reference target from §4.4: a target whose bytes are just a
/// null-terminated string, written the same way OWID writes its own
/// `domain` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTarget(pub String);

impl StringTarget {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl Target for StringTarget {
    fn add_owid_data(&self, writer: &mut Writer) -> Result<()> {
        writer.write_string(&self.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_target_writes_null_terminated_string() {
        let target = StringTarget::new("example test");
        let mut w = Writer::new();
        target.add_owid_data(&mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes, b"example test\0");
    }

    #[test]
    fn boxed_target_delegates() {
        let target: AnyTarget = Box::new(StringTarget::new("boxed"));
        let mut w = Writer::new();
        target.add_owid_data(&mut w).unwrap();
        assert_eq!(w.into_bytes(), b"boxed\0");
    }
}
