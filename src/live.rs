use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backend::GameBackend;
use crate::catalog::{self, PROJECTS};
use crate::error::{DriverError, EnvError, Result};
use crate::spaces::Observation;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

// =============================================================================
// Browser Driver Boundary
// =============================================================================

/// The primitives the live backend needs from a browser automation session.
/// No concrete WebDriver client ships with this crate.
pub trait BrowserDriver {
    type Element: Clone;

    fn open(&mut self, url: &str) -> DriverResult<()>;

    /// Tear the session down and start a new one.
    fn restart(&mut self) -> DriverResult<()>;

    fn find_by_id(&mut self, id: &str) -> DriverResult<Option<Self::Element>>;

    fn text(&mut self, element: &Self::Element) -> DriverResult<String>;

    fn is_enabled(&mut self, element: &Self::Element) -> DriverResult<bool>;

    fn click(&mut self, element: &Self::Element) -> DriverResult<()>;

    /// Value attribute of the selected option of a `<select>`.
    fn selected_value(&mut self, element: &Self::Element) -> DriverResult<String>;

    fn select_value(&mut self, element: &Self::Element, value: &str) -> DriverResult<()>;

    fn css_value(&mut self, element: &Self::Element, property: &str) -> DriverResult<String>;
}

// =============================================================================
// Page Layout
// =============================================================================

const FIELD_IDS: &[(&str, &str)] = &[
    ("Paperclips", "clips"),
    ("Available Funds", "funds"),
    ("Unsold Inventory", "unsoldClips"),
    ("Price per Clip", "margin"),
    ("Public Demand", "demand"),
    ("Marketing Level", "marketingLvl"),
    ("Marketing Cost", "adCost"),
    ("Manufacturing Clips per Second", "clipmakerRate"),
    ("Wire Inches", "wire"),
    ("Wire Cost", "wireCost"),
    ("Autoclipper Cost", "clipperCost"),
    ("Number of Autoclippers", "clipmakerLevel2"),
    ("Processors", "processors"),
    ("Memory", "memory"),
    ("Trust", "trust"),
    ("Next Trust", "nextTrust"),
    ("Operations", "operations"),
    ("Creativity", "creativity"),
    ("Investment Bankroll", "investmentBankroll"),
    ("Stocks", "secValue"),
    ("Latest QOps", "qCompDisplay"),
    ("MegaClipper Cost", "megaClipperCost"),
    ("Number of MegaClippers", "megaClipperLevel"),
    ("Investment Engine Level", "investmentLevel"),
    ("Investment Engine Upgrade Cost", "investUpgradeCost"),
    ("Yomi", "yomiDisplay"),
    ("Tournament Cost", "newTourneyCost"),
];

const BUTTON_IDS: &[(&str, &str)] = &[
    ("Make Paperclip", "btnMakePaperclip"),
    ("Lower Price", "btnLowerPrice"),
    ("Raise Price", "btnRaisePrice"),
    ("Expand Marketing", "btnExpandMarketing"),
    ("Buy Wire", "btnBuyWire"),
    ("Buy Autoclipper", "btnMakeClipper"),
    ("Add Processor", "btnAddProc"),
    ("Add Memory", "btnAddMem"),
    ("Deposit", "btnInvest"),
    ("Withdraw", "btnWithdraw"),
    ("Upgrade Investment Engine", "btnImproveInvestments"),
    ("Run New Tournament", "btnNewTournament"),
    ("Quantum Compute", "btnQcompute"),
    ("Buy MegaClipper", "btnMakeMegaClipper"),
];

const RISK_SELECT_ID: &str = "investStrat";
const RISK_LEVELS: &[(&str, &str, f64)] = &[
    ("Set Investment Low", "low", 7.0),
    ("Set Investment Medium", "med", 5.0),
    ("Set Investment High", "hi", 1.0),
];

const CHIP_ID: &str = "qChip0";

/// Scale applied when a field's text only parses after cleanup. The cost
/// displays drop their decimal point in that case.
fn fallback_scale(field: &str) -> f64 {
    match field {
        "Autoclipper Cost" | "MegaClipper Cost" => 0.01,
        _ => 1.0,
    }
}

fn button_id(action: &str) -> Option<String> {
    if let Some((_, id)) = BUTTON_IDS.iter().find(|(a, _)| *a == action) {
        return Some((*id).to_string());
    }
    catalog::project_by_action(action).map(|p| format!("projectButton{}", p.id))
}

/// Parse a number as the page renders it.
pub fn parse_display_number(field: &str, text: &str) -> Result<f64> {
    if let Ok(v) = text.trim().parse::<f64>() {
        return Ok(v);
    }
    let cleaned = text
        .replace("&nbsp;", "")
        .replace(',', "")
        .replace('\u{a0}', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(0.0);
    }
    cleaned
        .parse::<f64>()
        .map(|v| v * fallback_scale(field))
        .map_err(|_| EnvError::NumericParse {
            field: field.to_string(),
            text: text.to_string(),
        })
}

// =============================================================================
// Availability Rules
// =============================================================================

fn value(obs: &Observation, key: &str) -> f64 {
    obs.get(key).unwrap_or(0.0)
}

fn flag(obs: &Observation, key: &str) -> bool {
    value(obs, key) >= 1.0
}

struct Rule {
    fields: &'static [&'static str],
    check: fn(&Observation) -> bool,
}

const TRADING: &str = "Algorithmic Trading Activated";

fn rule(action: &str) -> Option<Rule> {
    let rule = match action {
        "Do Nothing" | "Raise Price" => Rule {
            fields: &[],
            check: |_| true,
        },
        "Make Paperclip" => Rule {
            fields: &["Wire Inches"],
            check: |o| value(o, "Wire Inches") >= 1.0,
        },
        "Lower Price" => Rule {
            fields: &["Price per Clip"],
            check: |o| value(o, "Price per Clip") > 0.01,
        },
        "Expand Marketing" => Rule {
            fields: &["Available Funds", "Marketing Cost"],
            check: |o| value(o, "Available Funds") >= value(o, "Marketing Cost"),
        },
        "Buy Wire" => Rule {
            fields: &["Available Funds", "Wire Cost"],
            check: |o| value(o, "Available Funds") >= value(o, "Wire Cost"),
        },
        "Buy Autoclipper" => Rule {
            fields: &["Available Funds", "Autoclipper Cost"],
            check: |o| value(o, "Available Funds") >= value(o, "Autoclipper Cost"),
        },
        "Add Processor" | "Add Memory" => Rule {
            fields: &["Trust", "Processors", "Memory"],
            check: |o| value(o, "Trust") > value(o, "Processors") + value(o, "Memory"),
        },
        "Set Investment Low" | "Set Investment Medium" | "Set Investment High" => Rule {
            fields: &[TRADING],
            check: |o| flag(o, TRADING),
        },
        "Deposit" => Rule {
            fields: &[TRADING, "Available Funds"],
            check: |o| flag(o, TRADING) && value(o, "Available Funds") > 0.0,
        },
        "Withdraw" => Rule {
            fields: &[TRADING, "Investment Bankroll"],
            check: |o| flag(o, TRADING) && value(o, "Investment Bankroll") > 0.0,
        },
        "Upgrade Investment Engine" => Rule {
            fields: &[TRADING, "Yomi", "Investment Engine Upgrade Cost"],
            check: |o| {
                flag(o, TRADING) && value(o, "Yomi") >= value(o, "Investment Engine Upgrade Cost")
            },
        },
        "Run New Tournament" => Rule {
            fields: &["Strategic Modeling Activated", "Operations", "Tournament Cost"],
            check: |o| {
                flag(o, "Strategic Modeling Activated")
                    && value(o, "Operations") >= value(o, "Tournament Cost")
            },
        },
        "Quantum Compute" => Rule {
            fields: &["Quantum Computing Activated", "Number of Photonic Chips"],
            check: |o| {
                flag(o, "Quantum Computing Activated") && value(o, "Number of Photonic Chips") != 0.0
            },
        },
        "Buy MegaClipper" => Rule {
            fields: &["MegaClippers Activated", "Available Funds", "MegaClipper Cost"],
            check: |o| {
                flag(o, "MegaClippers Activated")
                    && value(o, "Available Funds") >= value(o, "MegaClipper Cost")
            },
        },
        _ => return None,
    };
    Some(rule)
}

// =============================================================================
// Pacing
// =============================================================================

/// Keeps consecutive actions at least `interval` apart in wall-clock time.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
    over_budget_count: u64,
}

impl Pacer {
    pub fn new(interval_s: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(interval_s.max(0.0)),
            last: None,
            over_budget_count: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval_s: f64) {
        self.interval = Duration::from_secs_f64(interval_s.max(0.0));
    }

    /// Steps that arrived after their interval had already passed.
    pub fn over_budget_count(&self) -> u64 {
        self.over_budget_count
    }

    /// Forget the previous action so the next one goes out immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Block until the interval since the previous call has passed. Returns
    /// the time slept.
    pub fn wait(&mut self) -> Duration {
        let mut slept = Duration::ZERO;
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                slept = self.interval - elapsed;
                thread::sleep(slept);
            } else if elapsed > self.interval {
                self.over_budget_count += 1;
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = self.interval.as_millis() as u64,
                    "step exceeded pacing interval"
                );
            }
        }
        self.last = Some(Instant::now());
        slept
    }
}

// =============================================================================
// Live Backend
// =============================================================================

const RECONNECT_ATTEMPTS: usize = 2;

/// A real game page driven through a [`BrowserDriver`].
pub struct LiveBackend<D: BrowserDriver> {
    driver: D,
    url: String,
    buttons: HashMap<&'static str, D::Element>,
    /// Observation keys of projects bought this episode.
    active_projects: HashSet<&'static str>,
    pacer: Pacer,
    started: Instant,
}

impl<D: BrowserDriver> LiveBackend<D> {
    /// Wrap `driver` and load `url`.
    pub fn new(driver: D, url: impl Into<String>, pacing_interval_s: f64) -> Result<Self> {
        let mut backend = Self {
            driver,
            url: url.into(),
            buttons: HashMap::new(),
            active_projects: HashSet::new(),
            pacer: Pacer::new(pacing_interval_s),
            started: Instant::now(),
        };
        backend.reset()?;
        Ok(backend)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Run `op`, and on a dropped session reset the page and try again. A
    /// second consecutive disconnect propagates.
    fn with_reconnect<T>(
        &mut self,
        call: &'static str,
        mut op: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op(self) {
                Err(e) if e.is_transient() && attempt < RECONNECT_ATTEMPTS => {
                    warn!(call, attempt, error = %e, "browser disconnected, resetting and retrying");
                    self.reload()?;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn reload(&mut self) -> Result<()> {
        match self.driver.open(&self.url) {
            Err(DriverError::Disconnected(reason)) => {
                warn!(%reason, "unable to fetch page, starting a new browser session");
                self.driver.restart()?;
                self.driver.open(&self.url)?;
            }
            other => other?,
        }
        self.buttons.clear();
        self.active_projects.clear();
        self.pacer.reset();
        self.started = Instant::now();
        Ok(())
    }

    fn element(&mut self, id: &str) -> Result<D::Element> {
        self.driver
            .find_by_id(id)?
            .ok_or_else(|| DriverError::Command(format!("no element with id {id}")).into())
    }

    fn read_field(&mut self, key: &'static str) -> Result<f64> {
        if let Some(p) = catalog::project_by_flag(key) {
            return Ok(if self.active_projects.contains(p.activated) { 1.0 } else { 0.0 });
        }
        if let Some(p) = PROJECTS.iter().find(|p| p.available == key) {
            let shown = self.driver.find_by_id(&format!("projectButton{}", p.id))?;
            return Ok(if shown.is_some() { 1.0 } else { 0.0 });
        }
        match key {
            "Riskiness" => {
                let select = self.element(RISK_SELECT_ID)?;
                let selected = self.driver.selected_value(&select)?;
                RISK_LEVELS
                    .iter()
                    .find(|(_, v, _)| *v == selected)
                    .map(|&(_, _, r)| r)
                    .ok_or(EnvError::NumericParse {
                        field: key.to_string(),
                        text: selected,
                    })
            }
            "Number of Photonic Chips" | "Photonic Chip 0 Level" => {
                let chip = self.element(CHIP_ID)?;
                let text = self.driver.css_value(&chip, "opacity")?;
                let opacity = text.trim().parse::<f64>().map_err(|_| EnvError::NumericParse {
                    field: key.to_string(),
                    text: text.clone(),
                })?;
                // a fully opaque chip is inactive
                let active = opacity != 1.0;
                Ok(match (key, active) {
                    (_, false) => 0.0,
                    ("Number of Photonic Chips", true) => 1.0,
                    _ => opacity,
                })
            }
            _ => {
                let id = FIELD_IDS
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|&(_, id)| id)
                    .ok_or_else(|| EnvError::UnknownField(key.to_string()))?;
                let el = self.element(id)?;
                let text = self.driver.text(&el)?;
                parse_display_number(key, &text)
            }
        }
    }

    fn read_fields(&mut self, fields: &[&'static str]) -> Result<Observation> {
        let mut obs = Observation::with_capacity(fields.len());
        for &key in fields {
            let v = self.read_field(key)?;
            obs.set(key, v);
        }
        Ok(obs)
    }

    /// Cached button for `action` and whether it can be clicked right now.
    /// A stale cached element is evicted and reported as not clickable.
    fn find_button(&mut self, action: &'static str) -> Result<Option<D::Element>> {
        if !self.buttons.contains_key(action) {
            let id = button_id(action).ok_or_else(|| EnvError::UnknownAction(action.to_string()))?;
            match self.driver.find_by_id(&id)? {
                Some(el) => {
                    self.buttons.insert(action, el);
                }
                None => {
                    debug!(action, id = %id, "button not on page");
                    return Ok(None);
                }
            }
        }
        let Some(button) = self.buttons.get(action).cloned() else {
            return Ok(None);
        };
        match self.driver.is_enabled(&button) {
            Ok(true) => Ok(Some(button)),
            Ok(false) => Ok(None),
            Err(DriverError::StaleElement(reason)) => {
                debug!(action, %reason, "evicting stale button");
                self.buttons.remove(action);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn click_action(&mut self, action: &'static str) -> Result<bool> {
        if action == "Do Nothing" {
            return Ok(true);
        }
        if let Some(&(_, level, _)) = RISK_LEVELS.iter().find(|(a, _, _)| *a == action) {
            let select = self.element(RISK_SELECT_ID)?;
            self.driver.select_value(&select, level)?;
            return Ok(true);
        }
        let Some(button) = self.find_button(action)? else {
            return Ok(false);
        };
        match self.driver.click(&button) {
            Ok(()) => {}
            Err(DriverError::StaleElement(reason)) => {
                debug!(action, %reason, "button went stale before the click");
                self.buttons.remove(action);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(p) = catalog::project_by_action(action) {
            self.active_projects.insert(p.activated);
        }
        Ok(true)
    }

    fn availability(&mut self, candidates: &[&'static str]) -> Result<Vec<bool>> {
        let mut needed: Vec<&'static str> = Vec::new();
        for &action in candidates {
            let fields: &[&'static str] = match (rule(action), catalog::project_by_action(action)) {
                (Some(r), _) => r.fields,
                (None, Some(p)) => std::slice::from_ref(&p.available),
                (None, None) => &[],
            };
            for &f in fields {
                if !needed.contains(&f) {
                    needed.push(f);
                }
            }
        }
        let obs = self.read_fields(&needed)?;

        let mut mask = Vec::with_capacity(candidates.len());
        for &action in candidates {
            let ok = match rule(action) {
                Some(r) => (r.check)(&obs),
                None => {
                    let shown = catalog::project_by_action(action)
                        .map_or(true, |p| flag(&obs, p.available));
                    shown && self.find_button(action)?.is_some()
                }
            };
            mask.push(ok);
        }
        Ok(mask)
    }
}

impl<D: BrowserDriver> GameBackend for LiveBackend<D> {
    fn reset(&mut self) -> Result<()> {
        self.reload()
    }

    fn observe(&mut self, fields: &[&'static str]) -> Result<Observation> {
        self.with_reconnect("observe", |b| b.read_fields(fields))
    }

    fn act(&mut self, action: &str) -> Result<bool> {
        let action =
            catalog::action_key(action).ok_or_else(|| EnvError::UnknownAction(action.to_string()))?;
        self.pacer.wait();
        let taken = self.with_reconnect("act", |b| b.click_action(action))?;
        if !taken {
            debug!(action, "action unavailable");
        }
        Ok(taken)
    }

    fn advance_time(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(EnvError::InvalidTimeAdvance(seconds));
        }
        Ok(())
    }

    fn save_state(&mut self) -> Result<String> {
        Err(EnvError::Unsupported("save_state"))
    }

    fn load_state(&mut self, _state: &str) -> Result<()> {
        Err(EnvError::Unsupported("load_state"))
    }

    fn available_actions(&mut self, candidates: &[&'static str]) -> Result<Vec<bool>> {
        self.with_reconnect("available_actions", |b| b.availability(candidates))
    }

    fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn set_pacing_interval(&mut self, seconds: f64) {
        self.pacer.set_interval(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakePage {
        texts: HashMap<String, String>,
        disabled: HashSet<String>,
        stale: HashSet<String>,
        risk: String,
        opacity: String,
        clicks: Vec<String>,
        opens: usize,
        restarts: usize,
        /// Upcoming `find_by_id` calls that report a dropped session.
        disconnects: usize,
    }

    impl FakePage {
        fn game() -> Self {
            let mut page = FakePage {
                risk: "low".into(),
                opacity: "1".into(),
                ..Default::default()
            };
            for (id, text) in [
                ("clips", "1,234"),
                ("funds", "12.50"),
                ("wire", "&nbsp;800"),
                ("wireCost", "20"),
                ("clipperCost", "6,10"),
                ("margin", "0.25"),
                ("btnMakePaperclip", ""),
                ("btnBuyWire", ""),
                ("btnMakeClipper", ""),
                ("projectButton1", ""),
            ] {
                page.texts.insert(id.into(), text.into());
            }
            page
        }
    }

    impl BrowserDriver for FakePage {
        type Element = String;

        fn open(&mut self, _url: &str) -> DriverResult<()> {
            self.opens += 1;
            Ok(())
        }

        fn restart(&mut self) -> DriverResult<()> {
            self.restarts += 1;
            Ok(())
        }

        fn find_by_id(&mut self, id: &str) -> DriverResult<Option<String>> {
            if self.disconnects > 0 {
                self.disconnects -= 1;
                return Err(DriverError::Disconnected("connection reset".into()));
            }
            let known = self.texts.contains_key(id) || id == RISK_SELECT_ID || id == CHIP_ID;
            Ok(known.then(|| id.to_string()))
        }

        fn text(&mut self, el: &String) -> DriverResult<String> {
            Ok(self.texts.get(el).cloned().unwrap_or_default())
        }

        fn is_enabled(&mut self, el: &String) -> DriverResult<bool> {
            if self.stale.contains(el) {
                return Err(DriverError::StaleElement(el.clone()));
            }
            Ok(!self.disabled.contains(el))
        }

        fn click(&mut self, el: &String) -> DriverResult<()> {
            self.clicks.push(el.clone());
            Ok(())
        }

        fn selected_value(&mut self, _el: &String) -> DriverResult<String> {
            Ok(self.risk.clone())
        }

        fn select_value(&mut self, _el: &String, value: &str) -> DriverResult<()> {
            self.risk = value.to_string();
            Ok(())
        }

        fn css_value(&mut self, _el: &String, _property: &str) -> DriverResult<String> {
            Ok(self.opacity.clone())
        }
    }

    fn live() -> LiveBackend<FakePage> {
        LiveBackend::new(FakePage::game(), "file:///game/index.html", 0.0).unwrap()
    }

    #[test]
    fn display_numbers_parse_with_fallbacks() {
        assert_eq!(parse_display_number("Paperclips", "1,234").unwrap(), 1234.0);
        assert_eq!(parse_display_number("Wire Inches", "&nbsp;12").unwrap(), 12.0);
        assert_eq!(parse_display_number("Wire Inches", "1\u{a0}000").unwrap(), 1000.0);
        assert_eq!(parse_display_number("Operations", "  \n").unwrap(), 0.0);
        assert_eq!(parse_display_number("Autoclipper Cost", "5.00").unwrap(), 5.0);
        assert!((parse_display_number("Autoclipper Cost", "6,10").unwrap() - 6.1).abs() < 1e-12);
        assert!(matches!(
            parse_display_number("Yomi", "abc"),
            Err(EnvError::NumericParse { field, .. }) if field == "Yomi"
        ));
    }

    #[test]
    fn observe_reads_page_and_special_fields() {
        let mut b = live();
        b.driver_mut().opacity = "0.4".into();
        let obs = b
            .observe(&[
                "Paperclips",
                "Wire Inches",
                "Autoclipper Cost",
                "Riskiness",
                "Number of Photonic Chips",
                "Photonic Chip 0 Level",
                "Improved AutoClippers Available",
                "Creativity Available",
            ])
            .unwrap();
        assert_eq!(obs.get("Paperclips"), Some(1234.0));
        assert_eq!(obs.get("Wire Inches"), Some(800.0));
        assert_eq!(obs.get("Riskiness"), Some(7.0));
        assert_eq!(obs.get("Number of Photonic Chips"), Some(1.0));
        assert_eq!(obs.get("Photonic Chip 0 Level"), Some(0.4));
        assert_eq!(obs.get("Improved AutoClippers Available"), Some(1.0));
        assert_eq!(obs.get("Creativity Available"), Some(0.0));
    }

    #[test]
    fn unknown_risk_option_is_a_parse_error() {
        let mut b = live();
        b.driver_mut().risk = "yolo".into();
        assert!(matches!(b.observe(&["Riskiness"]), Err(EnvError::NumericParse { .. })));
    }

    #[test]
    fn project_click_marks_activation() {
        let mut b = live();
        let flag = "Improved AutoClippers Activated";
        assert_eq!(b.observe(&[flag]).unwrap().get(flag), Some(0.0));
        assert!(b.act("Activate Improved AutoClippers").unwrap());
        assert_eq!(b.observe(&[flag]).unwrap().get(flag), Some(1.0));
        assert_eq!(b.driver().clicks, vec!["projectButton1".to_string()]);

        b.reset().unwrap();
        assert_eq!(b.observe(&[flag]).unwrap().get(flag), Some(0.0));
    }

    #[test]
    fn disabled_missing_or_stale_buttons_are_not_taken() {
        let mut b = live();
        b.driver_mut().disabled.insert("btnBuyWire".into());
        assert!(!b.act("Buy Wire").unwrap());
        assert!(!b.act("Expand Marketing").unwrap());

        assert!(b.act("Make Paperclip").unwrap());
        b.driver_mut().stale.insert("btnMakePaperclip".into());
        assert!(!b.act("Make Paperclip").unwrap());
        b.driver_mut().stale.clear();
        assert!(b.act("Make Paperclip").unwrap());
        assert_eq!(b.driver().clicks.len(), 2);
        assert!(matches!(b.act("Fly"), Err(EnvError::UnknownAction(_))));
    }

    #[test]
    fn risk_actions_drive_the_select() {
        let mut b = live();
        assert!(b.act("Set Investment High").unwrap());
        assert_eq!(b.observe(&["Riskiness"]).unwrap().get("Riskiness"), Some(1.0));
    }

    #[test]
    fn availability_combines_rules_and_clickability() {
        let mut b = live();
        b.driver_mut().disabled.insert("projectButton1".into());
        let mask = b
            .available_actions(&[
                "Do Nothing",
                "Make Paperclip",
                "Buy Wire",
                "Buy Autoclipper",
                "Activate Improved AutoClippers",
                "Activate Creativity",
                "Deposit",
            ])
            .unwrap();
        assert_eq!(mask, vec![true, true, false, true, false, false, false]);
    }

    #[test]
    fn one_disconnect_is_retried_after_a_reset() {
        let mut b = live();
        assert_eq!(b.driver().opens, 1);
        b.driver_mut().disconnects = 1;
        let obs = b.observe(&["Paperclips"]).unwrap();
        assert_eq!(obs.get("Paperclips"), Some(1234.0));
        assert_eq!(b.driver().opens, 2);
    }

    #[test]
    fn second_consecutive_disconnect_propagates() {
        let mut b = live();
        b.driver_mut().disconnects = 2;
        let err = b.observe(&["Paperclips"]).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(b.driver().opens, 2);
    }

    #[test]
    fn save_and_load_are_unsupported() {
        let mut b = live();
        assert!(matches!(b.save_state(), Err(EnvError::Unsupported(_))));
        assert!(matches!(b.load_state("{}"), Err(EnvError::Unsupported(_))));
        assert!(b.advance_time(1.0).is_ok());
        assert!(b.advance_time(-1.0).is_err());
    }

    #[test]
    fn pacer_sleeps_the_remaining_interval() {
        let mut pacer = Pacer::new(0.05);
        let start = Instant::now();
        assert_eq!(pacer.wait(), Duration::ZERO);
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(pacer.over_budget_count(), 0);
    }

    #[test]
    fn pacer_flags_late_steps_without_sleeping() {
        let mut pacer = Pacer::new(0.001);
        pacer.wait();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(pacer.wait(), Duration::ZERO);
        assert_eq!(pacer.over_budget_count(), 1);
    }
}
