//! Typical/minimum/maximum process-corner triples.
//!
//! Every electrical quantity in a buffer model is carried as a
//! [`TypMinMax`]. A slot holding not-a-number is *unset*. Inheritance only
//! ever writes into unset slots, so a value someone declared explicitly can
//! never be clobbered by a default further up the chain.
//!
//! Scalars (load resistance, simulation time, derating percentages) follow
//! an older convention: they count as unset when they are not-a-number *or*
//! exactly zero. This cannot tell a deliberate zero from an absent value; it
//! is kept for compatibility with existing configurations.

use crate::units::parse_number;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Sub;

/// A (typical, minimum, maximum) triple. Not-a-number marks an unset slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TypMinMax {
    pub typ: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for TypMinMax {
    fn default() -> Self {
        Self::UNSET
    }
}

impl TypMinMax {
    /// All three slots unset.
    pub const UNSET: Self = Self {
        typ: f64::NAN,
        min: f64::NAN,
        max: f64::NAN,
    };

    pub fn new(typ: f64, min: f64, max: f64) -> Self {
        Self { typ, min, max }
    }

    /// Only the typical slot set; IBIS allows min/max to be `NA`.
    pub fn typ_only(typ: f64) -> Self {
        Self {
            typ,
            ..Self::UNSET
        }
    }

    pub fn slots(&self) -> [f64; 3] {
        [self.typ, self.min, self.max]
    }

    /// No slot is not-a-number.
    pub fn is_fully_set(&self) -> bool {
        self.slots().iter().all(|v| !v.is_nan())
    }

    /// Every slot is not-a-number.
    pub fn is_unset(&self) -> bool {
        self.slots().iter().all(|v| v.is_nan())
    }

    /// Copy `source` into every slot of `self` that is still unset.
    ///
    /// Returns the number of slots that changed.
    pub fn fill_from(&mut self, source: &TypMinMax) -> usize {
        let mut filled = 0;
        for (slot, value) in [
            (&mut self.typ, source.typ),
            (&mut self.min, source.min),
            (&mut self.max, source.max),
        ] {
            if slot.is_nan() && !value.is_nan() {
                *slot = value;
                filled += 1;
            }
        }
        filled
    }

    /// Equality that treats two unset slots as equal.
    pub fn same_as(&self, other: &TypMinMax) -> bool {
        self.slots()
            .iter()
            .zip(other.slots().iter())
            .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    }
}

/// Component-wise difference; an unset operand yields an unset slot.
impl Sub for TypMinMax {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            typ: self.typ - rhs.typ,
            min: self.min - rhs.min,
            max: self.max - rhs.max,
        }
    }
}

impl fmt::Display for TypMinMax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::units::format_si;
        write!(
            f,
            "{:<12} {:<12} {:<12}",
            format_si(self.typ),
            format_si(self.min),
            format_si(self.max)
        )
    }
}

/// Scalar unset rule: not-a-number or exactly zero.
#[inline]
pub fn scalar_is_unset(value: f64) -> bool {
    value.is_nan() || value == 0.0
}

/// Copy `source` into `target` when `target` is unset and `source` is not.
pub fn fill_scalar(target: &mut f64, source: f64) -> bool {
    if scalar_is_unset(*target) && !scalar_is_unset(source) {
        *target = source;
        true
    } else {
        false
    }
}

/// Default for scalar fields missing from a configuration.
pub fn unset_scalar() -> f64 {
    f64::NAN
}

// ============================================================================
// Serde
// ============================================================================

/// One slot on the wire: a number, an engineering string, or null / `"NA"`.
struct Slot(f64);

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_nan() {
            serializer.serialize_str("NA")
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

struct SlotVisitor;

impl<'de> Visitor<'de> for SlotVisitor {
    type Value = Slot;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number, an engineering-notation string, or NA")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Slot, E> {
        Ok(Slot(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Slot, E> {
        Ok(Slot(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Slot, E> {
        Ok(Slot(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Slot, E> {
        parse_number(v).map(Slot).map_err(E::custom)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Slot, E> {
        Ok(Slot(f64::NAN))
    }

    fn visit_none<E: de::Error>(self) -> Result<Slot, E> {
        Ok(Slot(f64::NAN))
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SlotVisitor)
    }
}

impl Serialize for TypMinMax {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        for value in self.slots() {
            tuple.serialize_element(&Slot(value))?;
        }
        tuple.end()
    }
}

struct TypMinMaxVisitor;

impl<'de> Visitor<'de> for TypMinMaxVisitor {
    type Value = TypMinMax;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("[typ, min, max], or a single typical value")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<TypMinMax, A::Error> {
        let mut slots = [f64::NAN; 3];
        for slot in slots.iter_mut() {
            match seq.next_element::<Slot>()? {
                Some(Slot(value)) => *slot = value,
                None => break,
            }
        }
        if seq.next_element::<Slot>()?.is_some() {
            return Err(de::Error::invalid_length(4, &self));
        }
        Ok(TypMinMax::new(slots[0], slots[1], slots[2]))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<TypMinMax, E> {
        Ok(TypMinMax::typ_only(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<TypMinMax, E> {
        Ok(TypMinMax::typ_only(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<TypMinMax, E> {
        Ok(TypMinMax::typ_only(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<TypMinMax, E> {
        parse_number(v).map(TypMinMax::typ_only).map_err(E::custom)
    }

    fn visit_unit<E: de::Error>(self) -> Result<TypMinMax, E> {
        Ok(TypMinMax::UNSET)
    }
}

impl<'de> Deserialize<'de> for TypMinMax {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TypMinMaxVisitor)
    }
}

/// `#[serde(with = "lib_types::tmm::scalar")]` for NaN-capable scalar fields.
pub mod scalar {
    use super::Slot;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Slot(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Slot::deserialize(deserializer).map(|slot| slot.0)
    }
}
