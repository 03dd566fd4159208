//! Row types for the local cache.

/// A named grouping of pictures, mapped 1:1 to a remote folder.
///
/// `id` is the folder id and `background_id` the id of a decorative image
/// sharing the folder's name prefix. Either may be empty when the
/// corresponding remote entry is missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub background_id: String,
}

/// Cached metadata for one remote image file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PictureRecord {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub is_favourite: bool,
}

impl PictureRecord {
    /// A fresh, non-favourite record as produced from a remote listing.
    pub fn new(id: String, category_id: String, name: String) -> Self {
        Self {
            id,
            category_id,
            name,
            is_favourite: false,
        }
    }

    /// The same record with the favourite flag inverted.
    pub fn toggled(&self) -> Self {
        Self {
            is_favourite: !self.is_favourite,
            ..self.clone()
        }
    }
}

/// Row counts for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSummary {
    pub categories: u64,
    pub pictures: u64,
    pub favourites: u64,
    pub schema_version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_not_favourite() {
        let record = PictureRecord::new("P1".into(), "F1".into(), "sky.jpg".into());
        assert!(!record.is_favourite);
        assert_eq!(record.category_id, "F1");
    }

    #[test]
    fn test_toggled_only_flips_flag() {
        let record = PictureRecord::new("P1".into(), "F1".into(), "sky.jpg".into());
        let flipped = record.toggled();
        assert!(flipped.is_favourite);
        assert_eq!(flipped.id, record.id);
        assert_eq!(flipped.category_id, record.category_id);
        assert_eq!(flipped.name, record.name);
        assert_eq!(flipped.toggled(), record);
    }
}
