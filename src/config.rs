use ir::DataLayout;

/// `major.minor.patch` triple stored in `air.version` style records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Language {
    pub name: String,
    pub version: Version,
}

/// Settings a [`crate::Context`] hands to every module created on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_layout: DataLayout,
    pub target_triple: String,
    pub version: Version,
    pub language: Language,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_layout: DataLayout::default(),
            target_triple: "air64-apple-macosx14.0.0".to_owned(),
            version: Version::new(2, 5, 0),
            language: Language { name: "Metal".to_owned(), version: Version::new(3, 0, 0) },
        }
    }
}

impl Config {
    pub fn with_data_layout(mut self, data_layout: DataLayout) -> Self {
        self.data_layout = data_layout;
        self
    }

    pub fn with_target_triple(mut self, triple: impl Into<String>) -> Self {
        self.target_triple = triple.into();
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_language(mut self, name: impl Into<String>, version: Version) -> Self {
        self.language = Language { name: name.into(), version };
        self
    }
}
