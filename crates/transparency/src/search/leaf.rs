use keytrans_crypto::hash::HASH_SIZE;

use super::SearchError;

/// One binary-search node, stored at its log position.
///
/// Wire format: `value (32) || uvarint(left) || uvarint(right)`, nothing
/// after. Pointers are log positions; 0 means none, and any pointer at or
/// past the current size is treated as none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf {
    pub value: [u8; HASH_SIZE],
    pub left: u64,
    pub right: u64,
}

impl Leaf {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HASH_SIZE + 2);
        out.extend_from_slice(&self.value);
        leb128::write::unsigned(&mut out, self.left).unwrap();
        leb128::write::unsigned(&mut out, self.right).unwrap();
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self, SearchError> {
        if data.len() < HASH_SIZE {
            return Err(SearchError::MalformedLeaf("truncated value"));
        }
        let mut value = [0u8; HASH_SIZE];
        value.copy_from_slice(&data[..HASH_SIZE]);

        let mut rest = &data[HASH_SIZE..];
        let left = leb128::read::unsigned(&mut rest)
            .map_err(|_| SearchError::MalformedLeaf("bad left pointer"))?;
        let right = leb128::read::unsigned(&mut rest)
            .map_err(|_| SearchError::MalformedLeaf("bad right pointer"))?;
        if !rest.is_empty() {
            return Err(SearchError::MalformedLeaf("trailing bytes"));
        }
        Ok(Leaf { value, left, right })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal_parse_roundtrip() {
        let leaf = Leaf {
            value: [0x5a; HASH_SIZE],
            left: 0,
            right: 300,
        };
        let data = leaf.marshal();
        assert_eq!(data.len(), HASH_SIZE + 1 + 2);
        assert_eq!(Leaf::parse(&data).unwrap(), leaf);
    }

    #[test]
    fn test_parse_rejects_trailing_bytes() {
        let mut data = Leaf {
            value: [0; HASH_SIZE],
            left: 1,
            right: 2,
        }
        .marshal();
        data.push(0);
        assert!(matches!(
            Leaf::parse(&data),
            Err(SearchError::MalformedLeaf("trailing bytes")),
        ));
    }

    #[test]
    fn test_parse_rejects_truncation() {
        assert!(Leaf::parse(&[0u8; HASH_SIZE]).is_err());
        assert!(Leaf::parse(&[0u8; 12]).is_err());
    }
}
