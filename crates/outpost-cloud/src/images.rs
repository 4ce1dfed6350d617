//! Default boot images per region

use crate::error::{CloudError, Result};
use std::collections::BTreeMap;

/// Ubuntu 13.04 64-bit EBS images, see http://cloud-images.ubuntu.com/locator/ec2/
const UBUNTU_RARING_IMAGES: &[(&str, &str)] = &[
    ("ap-northeast-1", "ami-6b26ab6a"),
    ("ap-southeast-1", "ami-2b511e79"),
    ("ap-southeast-2", "ami-84a333be"),
    ("eu-west-1", "ami-3d160149"),
    ("sa-east-1", "ami-28e43e35"),
    ("us-east-1", "ami-c30360aa"),
    ("us-west-1", "ami-d383af96"),
    ("us-west-2", "ami-bf1d8a8f"),
];

/// Immutable region -> image lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionImageTable {
    images: BTreeMap<String, String>,
}

impl Default for RegionImageTable {
    fn default() -> Self {
        UBUNTU_RARING_IMAGES.iter().copied().collect()
    }
}

impl<R: Into<String>, I: Into<String>> FromIterator<(R, I)> for RegionImageTable {
    fn from_iter<T: IntoIterator<Item = (R, I)>>(iter: T) -> Self {
        Self {
            images: iter
                .into_iter()
                .map(|(r, i)| (r.into(), i.into()))
                .collect(),
        }
    }
}

impl RegionImageTable {
    pub fn empty() -> Self {
        Self {
            images: BTreeMap::new(),
        }
    }

    /// Copy of this table with `region` mapped to `image_id`
    pub fn with_image(mut self, region: impl Into<String>, image_id: impl Into<String>) -> Self {
        self.images.insert(region.into(), image_id.into());
        self
    }

    /// Default image for `region`
    pub fn lookup(&self, region: &str) -> Result<&str> {
        self.images
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| CloudError::UnsupportedRegion(region.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.images.iter().map(|(r, i)| (r.as_str(), i.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = RegionImageTable::default();
        assert_eq!(table.lookup("us-east-1").unwrap(), "ami-c30360aa");
        assert_eq!(table.iter().count(), 8);
    }

    #[test]
    fn test_unmapped_region_names_region() {
        let err = RegionImageTable::default()
            .lookup("mars-north-1")
            .unwrap_err();
        assert!(matches!(err, CloudError::UnsupportedRegion(ref r) if r == "mars-north-1"));
        assert!(err.to_string().contains("mars-north-1"));
    }

    #[test]
    fn test_with_image_overrides() {
        let table = RegionImageTable::empty().with_image("eu-central-1", "ami-1234");
        assert_eq!(table.lookup("eu-central-1").unwrap(), "ami-1234");
        assert!(table.lookup("us-east-1").is_err());
    }
}
