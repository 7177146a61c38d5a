// =============================================================================
// Field and Action Catalog
// =============================================================================
//
// Every observable quantity and every action name the environment knows about.
// Stage definitions and both backends resolve names against these tables, so a
// typo anywhere fails at construction time instead of mid-episode.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub low: f64,
    pub high: f64,
}

const fn field(key: &'static str, low: f64, high: f64) -> FieldSpec {
    FieldSpec { key, low, high }
}

pub const FIELDS: &[FieldSpec] = &[
    field("Paperclips", 0.0, 1.0e6),
    field("Available Funds", 0.0, 1.0e6),
    field("Unsold Inventory", 0.0, 1.0e3),
    field("Price per Clip", 0.0, 1.0),
    field("Public Demand", 0.0, 1.0e3),
    field("Marketing Level", 0.0, 1.0e2),
    field("Marketing Cost", 0.0, 1.0e2),
    field("Manufacturing Clips per Second", 0.0, 1.0e4),
    field("Wire Inches", 0.0, 1.0e4),
    field("Wire Cost", 0.0, 1.0e2),
    field("Autoclipper Cost", 0.0, 1.0e4),
    field("Number of Autoclippers", 0.0, 1.0e2),
    field("Processors", 0.0, 1.0e2),
    field("Memory", 0.0, 1.0e2),
    field("Trust", 0.0, 1.0e2),
    field("Next Trust", 0.0, 1.0e6),
    field("Operations", 0.0, 1.0e4),
    field("Creativity", 0.0, 1.0e4),
    field("Investment Bankroll", 0.0, 1.0e6),
    field("Stocks", 0.0, 1.0e6),
    field("Riskiness", 0.0, 7.0),
    field("Investment Engine Level", 0.0, 1.0e1),
    field("Investment Engine Upgrade Cost", 0.0, 1.0e4),
    field("Yomi", 0.0, 1.0e4),
    field("Tournament Cost", 0.0, 1.0e5),
    field("Number of Photonic Chips", 0.0, 1.0e1),
    field("Photonic Chip 0 Level", -1.0, 1.0),
    field("Latest QOps", -1.0e3, 1.0e3),
    field("MegaClipper Cost", 0.0, 1.0e5),
    field("Number of MegaClippers", 0.0, 1.0e2),
];

// =============================================================================
// Projects
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Project {
    pub name: &'static str,
    pub id: &'static str,
    /// Observation key, 1 once the project has been bought.
    pub activated: &'static str,
    /// Observation key, 1 while the project's button is on the page.
    pub available: &'static str,
    /// Action key that buys the project.
    pub action: &'static str,
}

macro_rules! project {
    ($name:literal, $id:literal) => {
        Project {
            name: $name,
            id: $id,
            activated: concat!($name, " Activated"),
            available: concat!($name, " Available"),
            action: concat!("Activate ", $name),
        }
    };
}

pub const PROJECTS: &[Project] = &[
    project!("Improved AutoClippers", "1"),
    project!("Beg for More Wire", "2"),
    project!("Creativity", "3"),
    project!("Even Better AutoClippers", "4"),
    project!("Optimized AutoClippers", "5"),
    project!("Limerick", "6"),
    project!("Improved Wire Extrusion", "7"),
    project!("Optimized Wire Extrusion", "8"),
    project!("Microlattice Shapecasting", "9"),
    project!("Spectral Froth Annealment", "10"),
    project!("New Slogan", "11"),
    project!("Catchy Jingle", "12"),
    project!("Lexical Processing", "13"),
    project!("Combinatory Harmonics", "14"),
    project!("The Hadwiger Problem", "15"),
    project!("Hadwiger Clip Diagrams", "16"),
    project!("The Toth Sausage Conjecture", "17"),
    project!("Donkey Space", "19"),
    project!("Strategic Modeling", "20"),
    project!("Algorithmic Trading", "21"),
    project!("MegaClippers", "22"),
    project!("WireBuyer", "26"),
    project!("Hypno Harmonics", "34"),
    project!("RevTracker", "42"),
    project!("Quantum Computing", "50"),
    project!("Photonic Chip", "51"),
];

const FLAG_RANGE: (f64, f64) = (0.0, 1.0);

pub fn project(name: &str) -> Option<&'static Project> {
    PROJECTS.iter().find(|p| p.name == name)
}

pub fn project_by_action(action: &str) -> Option<&'static Project> {
    PROJECTS.iter().find(|p| p.action == action)
}

pub fn project_by_flag(field: &str) -> Option<&'static Project> {
    PROJECTS.iter().find(|p| p.activated == field)
}

/// Resolve a field key, including the generated per-project flag fields.
pub fn field_spec(key: &str) -> Option<FieldSpec> {
    if let Some(spec) = FIELDS.iter().find(|f| f.key == key) {
        return Some(*spec);
    }
    PROJECTS.iter().find_map(|p| {
        if p.activated == key {
            Some(field(p.activated, FLAG_RANGE.0, FLAG_RANGE.1))
        } else if p.available == key {
            Some(field(p.available, FLAG_RANGE.0, FLAG_RANGE.1))
        } else {
            None
        }
    })
}

// =============================================================================
// Actions
// =============================================================================

pub const BASE_ACTIONS: &[&str] = &[
    "Do Nothing",
    "Make Paperclip",
    "Lower Price",
    "Raise Price",
    "Expand Marketing",
    "Buy Wire",
    "Buy Autoclipper",
    "Add Processor",
    "Add Memory",
    "Set Investment Low",
    "Set Investment Medium",
    "Set Investment High",
    "Deposit",
    "Withdraw",
    "Upgrade Investment Engine",
    "Run New Tournament",
    "Quantum Compute",
    "Buy MegaClipper",
];

pub fn action_key(name: &str) -> Option<&'static str> {
    BASE_ACTIONS
        .iter()
        .copied()
        .find(|a| *a == name)
        .or_else(|| project_by_action(name).map(|p| p.action))
}

pub fn all_actions() -> impl Iterator<Item = &'static str> {
    BASE_ACTIONS
        .iter()
        .copied()
        .chain(PROJECTS.iter().map(|p| p.action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_keys_are_generated_from_names() {
        let p = project("Algorithmic Trading").unwrap();
        assert_eq!(p.id, "21");
        assert_eq!(p.activated, "Algorithmic Trading Activated");
        assert_eq!(p.action, "Activate Algorithmic Trading");
        assert_eq!(project_by_flag("Photonic Chip Activated").unwrap().id, "51");
    }

    #[test]
    fn flags_resolve_with_unit_range() {
        let spec = field_spec("WireBuyer Activated").unwrap();
        assert_eq!((spec.low, spec.high), (0.0, 1.0));
        assert!(field_spec("Wire Inches").is_some());
        assert!(field_spec("Wire Inchez").is_none());
    }

    #[test]
    fn every_field_has_a_positive_upper_bound() {
        for spec in FIELDS {
            assert!(spec.high > 0.0, "{} has non-positive high", spec.key);
        }
    }

    #[test]
    fn action_keys_cover_projects() {
        assert_eq!(action_key("Activate RevTracker"), Some("Activate RevTracker"));
        assert_eq!(action_key("Buy Wire"), Some("Buy Wire"));
        assert_eq!(action_key("Buy Spaceship"), None);
        let names: Vec<_> = all_actions().collect();
        assert_eq!(names.len(), BASE_ACTIONS.len() + PROJECTS.len());
    }
}
