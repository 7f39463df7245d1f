//! Packed set of output ids owned by one address.
//!
//! Layout: little-endian u64 count, then `count` 32-byte ids back to back.
//! Insertion appends; removal moves the last id into the hole.

use crate::types::OutputId;

const COUNT_LEN: usize = 8;
const ID_LEN: usize = 32;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct OwnershipSet {
    buf: Vec<u8>,
}

impl OwnershipSet {
    pub fn decode(buf: Vec<u8>) -> Result<Self, String> {
        if buf.is_empty() {
            return Ok(Self::default());
        }
        if buf.len() < COUNT_LEN || (buf.len() - COUNT_LEN) % ID_LEN != 0 {
            return Err(format!("misaligned ownership set of {} bytes", buf.len()));
        }
        let set = Self { buf };
        if set.count() as usize != set.ids_region().len() / ID_LEN {
            return Err("ownership set count disagrees with its length".into());
        }
        Ok(set)
    }

    fn count(&self) -> u64 {
        match self.buf.get(..COUNT_LEN) {
            Some(head) => {
                let mut le = [0u8; COUNT_LEN];
                le.copy_from_slice(head);
                u64::from_le_bytes(le)
            }
            None => 0,
        }
    }

    fn set_count(&mut self, n: u64) {
        self.buf[..COUNT_LEN].copy_from_slice(&n.to_le_bytes());
    }

    fn ids_region(&self) -> &[u8] {
        self.buf.get(COUNT_LEN..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.ids_region().len() / ID_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, id: &OutputId) -> Option<usize> {
        self.ids_region().chunks_exact(ID_LEN).position(|c| c == id.as_bytes())
    }

    pub fn contains(&self, id: &OutputId) -> bool {
        self.position(id).is_some()
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: &OutputId) -> bool {
        if self.contains(id) {
            return false;
        }
        if self.buf.is_empty() {
            self.buf.resize(COUNT_LEN, 0);
        }
        self.buf.extend_from_slice(id.as_bytes());
        let n = self.count() + 1;
        self.set_count(n);
        true
    }

    /// Returns false if the id was not present.
    pub fn remove(&mut self, id: &OutputId) -> bool {
        let Some(pos) = self.position(id) else { return false };
        let start = COUNT_LEN + pos * ID_LEN;
        let last = self.buf.len() - ID_LEN;
        if start != last {
            self.buf.copy_within(last.., start);
        }
        self.buf.truncate(last);
        let n = self.count() - 1;
        self.set_count(n);
        true
    }

    pub fn ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        self.ids_region().chunks_exact(ID_LEN).map(|c| {
            let mut id = [0u8; ID_LEN];
            id.copy_from_slice(c);
            OutputId(id)
        })
    }

    /// Bytes to persist, or `None` when the set is empty and its key should
    /// be deleted.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        if self.is_empty() { None } else { Some(self.buf) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> OutputId {
        OutputId([n; 32])
    }

    #[test]
    fn insert_then_remove_swaps_last_into_hole() {
        let mut s = OwnershipSet::default();
        assert!(s.insert(&id(1)));
        assert!(s.insert(&id(2)));
        assert!(s.insert(&id(3)));
        assert!(!s.insert(&id(2)));
        assert!(s.remove(&id(1)));
        assert_eq!(s.ids().collect::<Vec<_>>(), vec![id(3), id(2)]);
        assert!(!s.remove(&id(1)));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn encoding_has_count_prefix() {
        let mut s = OwnershipSet::default();
        s.insert(&id(7));
        let bytes = s.clone().into_bytes().unwrap();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[..8], &1u64.to_le_bytes());
        assert_eq!(OwnershipSet::decode(bytes).unwrap(), s);
    }

    #[test]
    fn emptied_set_asks_for_deletion() {
        let mut s = OwnershipSet::default();
        s.insert(&id(7));
        s.remove(&id(7));
        assert_eq!(s.into_bytes(), None);
    }

    #[test]
    fn search_only_matches_aligned_ids() {
        // an id whose bytes straddle two entries must not be found
        let mut s = OwnershipSet::default();
        s.insert(&OutputId([0xAA; 32]));
        s.insert(&OutputId([0xBB; 32]));
        let mut straddle = [0xAA; 32];
        straddle[16..].copy_from_slice(&[0xBB; 16]);
        assert!(!s.contains(&OutputId(straddle)));
    }

    #[test]
    fn rejects_misaligned_buffers() {
        assert!(OwnershipSet::decode(vec![0u8; 9]).is_err());
        let mut bad = 2u64.to_le_bytes().to_vec();
        bad.extend_from_slice(&[0u8; 32]);
        assert!(OwnershipSet::decode(bad).is_err());
    }
}
