use std::fmt;

/// Kinds of point-of-interest a feature can mark.
///
/// The set is closed: any wire name this console does not know parses to
/// [`FeatureType::Unknown`], which renders with a fallback glyph instead of
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    Aed,
    Bad,
    Biohazard,
    Door,
    Elevator,
    Exit,
    Extinguisher,
    Fire,
    FirstAid,
    Headset,
    Injury,
    Message,
    Object,
    Person,
    Point,
    Stairs,
    Warning,
    Unknown,
}

impl FeatureType {
    pub const ALL: [FeatureType; 18] = [
        FeatureType::Aed,
        FeatureType::Bad,
        FeatureType::Biohazard,
        FeatureType::Door,
        FeatureType::Elevator,
        FeatureType::Exit,
        FeatureType::Extinguisher,
        FeatureType::Fire,
        FeatureType::FirstAid,
        FeatureType::Headset,
        FeatureType::Injury,
        FeatureType::Message,
        FeatureType::Object,
        FeatureType::Person,
        FeatureType::Point,
        FeatureType::Stairs,
        FeatureType::Warning,
        FeatureType::Unknown,
    ];

    /// Parses a wire name, case-insensitively. Never fails.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .unwrap_or(FeatureType::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureType::Aed => "aed",
            FeatureType::Bad => "bad",
            FeatureType::Biohazard => "biohazard",
            FeatureType::Door => "door",
            FeatureType::Elevator => "elevator",
            FeatureType::Exit => "exit",
            FeatureType::Extinguisher => "extinguisher",
            FeatureType::Fire => "fire",
            FeatureType::FirstAid => "first-aid",
            FeatureType::Headset => "headset",
            FeatureType::Injury => "injury",
            FeatureType::Message => "message",
            FeatureType::Object => "object",
            FeatureType::Person => "person",
            FeatureType::Point => "point",
            FeatureType::Stairs => "stairs",
            FeatureType::Warning => "warning",
            FeatureType::Unknown => "unknown",
        }
    }

    /// Glyph name the map canvas draws this kind with.
    pub fn icon(self) -> &'static str {
        match self {
            FeatureType::Aed => "heartbeat",
            FeatureType::Bad => "thumbs-down",
            FeatureType::Biohazard => "biohazard",
            FeatureType::Door => "door-closed",
            FeatureType::Elevator => "sort",
            FeatureType::Exit => "sign-out-alt",
            FeatureType::Extinguisher => "fire-extinguisher",
            FeatureType::Fire => "fire",
            FeatureType::FirstAid => "first-aid",
            FeatureType::Headset => "vr-cardboard",
            FeatureType::Injury => "user-injured",
            FeatureType::Message => "comment",
            FeatureType::Object => "cube",
            FeatureType::Person => "user",
            FeatureType::Point => "map-marker-alt",
            FeatureType::Stairs => "walking",
            FeatureType::Warning => "exclamation-triangle",
            FeatureType::Unknown => "question",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_name_parses_back_to_itself() {
        for t in FeatureType::ALL {
            assert_eq!(FeatureType::parse(t.as_str()), t);
        }
    }

    #[test]
    fn unknown_names_fall_back() {
        assert_eq!(FeatureType::parse("spaceship"), FeatureType::Unknown);
        assert_eq!(FeatureType::parse(""), FeatureType::Unknown);
        assert_eq!(FeatureType::parse("spaceship").icon(), "question");
    }

    #[test]
    fn parse_ignores_case_and_padding() {
        assert_eq!(FeatureType::parse(" First-Aid "), FeatureType::FirstAid);
    }
}
