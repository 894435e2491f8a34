//! `Line` — the bundle of up to three payloads sharing one identifier.

use bytes::Bytes;

use crate::kind::Kind;

/// A mapping from `Kind` to a byte payload, each kind independently present
/// or absent.
///
/// Invariant: no payload is zero-length in a committed line. `put` treats a
/// zero-length payload as a no-op (absent), matching the resolved behaviour
/// for Open Question 1 — an empty `p<k>` write never produces a file or map
/// entry a later `Get` can see.
#[derive(Debug, Clone, Default)]
pub struct Line {
    asset: Option<Bytes>,
    info: Option<Bytes>,
    resource: Option<Bytes>,
}

impl Line {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `kind`. A zero-length payload is treated as
    /// absent rather than stored, and clears any earlier write of the same
    /// kind within this line.
    pub fn put(&mut self, kind: Kind, data: Bytes) {
        let slot = self.slot_mut(kind);
        *slot = if data.is_empty() { None } else { Some(data) };
    }

    pub fn get(&self, kind: Kind) -> Option<&Bytes> {
        self.slot(kind).as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.asset.is_none() && self.info.is_none() && self.resource.is_none()
    }

    /// Sum of the present payload lengths.
    pub fn size(&self) -> u64 {
        Kind::ALL
            .iter()
            .filter_map(|k| self.slot(*k).as_ref())
            .map(|b| b.len() as u64)
            .sum()
    }

    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        Kind::ALL.into_iter().filter(move |k| self.slot(*k).is_some())
    }

    fn slot(&self, kind: Kind) -> &Option<Bytes> {
        match kind {
            Kind::Asset => &self.asset,
            Kind::Info => &self.info,
            Kind::Resource => &self.resource,
        }
    }

    fn slot_mut(&mut self, kind: Kind) -> &mut Option<Bytes> {
        match kind {
            Kind::Asset => &mut self.asset,
            Kind::Info => &mut self.info,
            Kind::Resource => &mut self.resource,
        }
    }
}
