//! Classification of free-text profile locations into tracked regions.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    /// Short name used in output file names.
    pub name: String,
    pub keywords: Vec<String>,
}

const SWEDEN_KEYWORDS: &[&str] = &[
    "Sweden", "Sverige", "Stockholm", "Gothenburg", "Malmö", "Uppsala", "Lund", "Linköping",
    "Umeå", "Örebro", "Västerås", "Helsingborg", "Norrköping", "Jönköping", "Swedish",
];

const UK_KEYWORDS: &[&str] = &[
    "United Kingdom", "UK", "England", "Scotland", "Wales", "Northern Ireland", "London",
    "Manchester", "Birmingham", "Edinburgh", "Glasgow", "Liverpool", "Bristol", "Cardiff",
    "Belfast", "Leeds", "Sheffield", "Nottingham", "Newcastle", "Aberdeen", "Oxford",
    "Cambridge", "Britain", "British",
];

impl Region {
    pub fn new(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn sweden() -> Self {
        Self::new("sweden", SWEDEN_KEYWORDS)
    }

    pub fn uk() -> Self {
        Self::new("uk", UK_KEYWORDS)
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::sweden(), Self::uk()]
    }

    /// Case-sensitive substring match of any keyword.
    pub fn matches(&self, location: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| location.contains(keyword.as_str()))
    }
}

/// Regions whose keywords appear in `location`. A location may fall in several.
pub fn classify<'a>(location: &'a str, regions: &'a [Region]) -> impl Iterator<Item = &'a Region> {
    regions.iter().filter(move |region| region.matches(location))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_matches_its_country() {
        assert!(Region::sweden().matches("Göteborg / Malmö"));
        assert!(Region::uk().matches("London, UK"));
        assert!(!Region::sweden().matches("Oslo, Norway"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert!(!Region::sweden().matches("stockholm"));
    }

    #[test]
    fn test_classify_can_return_several_regions() {
        let regions = Region::builtin();
        let names: Vec<&str> = classify("Swedish expat in London", &regions)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["sweden", "uk"]);
        assert_eq!(classify("Unknown", &regions).count(), 0);
    }
}
