//! Resource identifiers
//!
//! A client uploads one file per resource. Each file stream is announced by
//! a single identifier byte.

use std::fmt;

/// Input file kinds, in upload order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Resource {
    Movies = 0,
    Credits = 1,
    Ratings = 2,
}

impl Resource {
    /// Every resource, ordered by id
    pub const ALL: [Resource; 3] = [Resource::Movies, Resource::Credits, Resource::Ratings];

    /// Resolve an identifier byte
    #[inline]
    pub fn from_u8(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Movies),
            1 => Some(Self::Credits),
            2 => Some(Self::Ratings),
            _ => None,
        }
    }

    /// Identifier byte sent on the wire
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Resource name, also the CSV file stem
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Credits => "credits",
            Self::Ratings => "ratings",
        }
    }

    /// Look up by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_ordered() {
        for (i, resource) in Resource::ALL.iter().enumerate() {
            assert_eq!(resource.to_u8() as usize, i);
            assert_eq!(Resource::from_u8(i as u8), Some(*resource));
        }
        assert_eq!(Resource::from_u8(3), None);
        assert_eq!(Resource::from_u8(255), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(Resource::Movies.to_string(), "movies");
        assert_eq!(Resource::from_name("ratings"), Some(Resource::Ratings));
        assert_eq!(Resource::from_name("reviews"), None);
    }
}
