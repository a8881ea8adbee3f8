use crate::common::{CrabError, PageId, Result, INDEX_NAME_SIZE, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const RECORD_SIZE: usize = INDEX_NAME_SIZE + 4; // name + root_page_id
/// Maximum number of index records a header page can hold
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// View over page 0: the catalog of `(index name, root page id)` records.
///
/// Layout: `record_count: u32`, then `record_count` records of a zero-padded
/// name and a little-endian root page id. A zeroed page is an empty catalog.
pub struct HeaderPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HeaderPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        u32::from_le_bytes(
            self.data.as_ref()[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
                .try_into()
                .unwrap(),
        ) as usize
    }

    /// Returns the root page id registered under `name`.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        self.find_record(name).map(|i| self.root_at(i))
    }

    /// Returns the index names in record order.
    pub fn names(&self) -> Vec<String> {
        (0..self.record_count())
            .map(|i| {
                let raw = self.name_at(i);
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                String::from_utf8_lossy(&raw[..end]).into_owned()
            })
            .collect()
    }

    fn record_offset(index: usize) -> usize {
        RECORDS_OFFSET + index * RECORD_SIZE
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let off = Self::record_offset(index);
        &self.data.as_ref()[off..off + INDEX_NAME_SIZE]
    }

    fn root_at(&self, index: usize) -> PageId {
        let off = Self::record_offset(index) + INDEX_NAME_SIZE;
        PageId::new(u32::from_le_bytes(
            self.data.as_ref()[off..off + 4].try_into().unwrap(),
        ))
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        let padded = pad_name(name).ok()?;
        (0..self.record_count()).find(|&i| self.name_at(i) == padded)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeaderPage<B> {
    /// Adds a record. Returns false if `name` is already registered.
    pub fn insert_record(&mut self, name: &str, root_id: PageId) -> Result<bool> {
        let padded = pad_name(name)?;
        if self.find_record(name).is_some() {
            return Ok(false);
        }

        let count = self.record_count();
        if count >= MAX_HEADER_RECORDS {
            return Err(CrabError::HeaderPageFull);
        }

        let off = Self::record_offset(count);
        self.data.as_mut()[off..off + INDEX_NAME_SIZE].copy_from_slice(&padded);
        self.set_root_at(count, root_id);
        self.set_record_count(count + 1);
        Ok(true)
    }

    /// Changes the root recorded for `name`. Returns false if absent.
    pub fn update_record(&mut self, name: &str, root_id: PageId) -> bool {
        match self.find_record(name) {
            Some(i) => {
                self.set_root_at(i, root_id);
                true
            }
            None => false,
        }
    }

    /// Removes the record for `name`, keeping the others contiguous.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let Some(i) = self.find_record(name) else {
            return false;
        };

        let count = self.record_count();
        let start = Self::record_offset(i + 1);
        let end = Self::record_offset(count);
        self.data
            .as_mut()
            .copy_within(start..end, Self::record_offset(i));

        let last = Self::record_offset(count - 1);
        self.data.as_mut()[last..last + RECORD_SIZE].fill(0);
        self.set_record_count(count - 1);
        true
    }

    fn set_root_at(&mut self, index: usize, root_id: PageId) {
        let off = Self::record_offset(index) + INDEX_NAME_SIZE;
        self.data.as_mut()[off..off + 4].copy_from_slice(&root_id.as_u32().to_le_bytes());
    }

    fn set_record_count(&mut self, count: usize) {
        self.data.as_mut()[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }
}

fn pad_name(name: &str) -> Result<[u8; INDEX_NAME_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > INDEX_NAME_SIZE {
        return Err(CrabError::IndexNameTooLong(name.to_string()));
    }

    let mut padded = [0u8; INDEX_NAME_SIZE];
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_page_empty() {
        let data = [0u8; PAGE_SIZE];
        let header = HeaderPage::new(&data[..]);
        assert_eq!(header.record_count(), 0);
        assert_eq!(header.get_root_id("idx"), None);
    }

    #[test]
    fn test_header_page_insert_update_delete() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data[..]);

        assert!(header.insert_record("a", PageId::new(3)).unwrap());
        assert!(header.insert_record("b", PageId::new(4)).unwrap());
        assert!(!header.insert_record("a", PageId::new(9)).unwrap());
        assert_eq!(header.get_root_id("a"), Some(PageId::new(3)));

        assert!(header.update_record("b", PageId::new(7)));
        assert!(!header.update_record("c", PageId::new(7)));
        assert_eq!(header.get_root_id("b"), Some(PageId::new(7)));

        assert!(header.delete_record("a"));
        assert!(!header.delete_record("a"));
        assert_eq!(header.record_count(), 1);
        assert_eq!(header.get_root_id("b"), Some(PageId::new(7)));
        assert_eq!(header.names(), vec!["b".to_string()]);
    }

    #[test]
    fn test_header_page_name_limits() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data[..]);

        let long = "x".repeat(INDEX_NAME_SIZE + 1);
        assert!(matches!(
            header.insert_record(&long, PageId::new(1)),
            Err(CrabError::IndexNameTooLong(_))
        ));

        let exact = "y".repeat(INDEX_NAME_SIZE);
        assert!(header.insert_record(&exact, PageId::new(2)).unwrap());
        assert_eq!(header.get_root_id(&exact), Some(PageId::new(2)));
    }

    #[test]
    fn test_header_page_full() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut data[..]);

        for i in 0..MAX_HEADER_RECORDS {
            header
                .insert_record(&format!("idx{}", i), PageId::new(i as u32))
                .unwrap();
        }
        assert!(matches!(
            header.insert_record("one_more", PageId::new(0)),
            Err(CrabError::HeaderPageFull)
        ));
    }
}
