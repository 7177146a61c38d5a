use crate::catalog::{self, FieldSpec};
use crate::error::{EnvError, Result};

// =============================================================================
// Observation
// =============================================================================

/// Named field values in the order they were requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    entries: Vec<(&'static str, f64)>,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    pub fn from_pairs(pairs: &[(&'static str, f64)]) -> Self {
        Self {
            entries: pairs.to_vec(),
        }
    }

    /// Insert or overwrite `key`.
    pub fn set(&mut self, key: &'static str, value: f64) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|&(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.entries.iter().copied()
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value:.4}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Observation Space
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSpace {
    fields: Vec<FieldSpec>,
}

impl ObservationSpace {
    pub fn new<S: AsRef<str>>(keys: &[S]) -> Result<Self> {
        let fields = keys
            .iter()
            .map(|k| {
                catalog::field_spec(k.as_ref())
                    .ok_or_else(|| EnvError::UnknownField(k.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.key).collect()
    }

    pub fn specs(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Divide each field by its normalization upper bound. Values outside
    /// `[low, high]` pass through unclamped.
    pub fn to_vector(&self, obs: &Observation) -> Result<Vec<f32>> {
        self.fields
            .iter()
            .map(|spec| {
                obs.get(spec.key)
                    .map(|v| (v / spec.high) as f32)
                    .ok_or_else(|| EnvError::UnknownField(spec.key.to_string()))
            })
            .collect()
    }

    pub fn to_named(&self, vector: &[f32]) -> Result<Observation> {
        if vector.len() != self.fields.len() {
            return Err(EnvError::Config(format!(
                "observation vector has {} entries, space has {}",
                vector.len(),
                self.fields.len()
            )));
        }
        let mut obs = Observation::with_capacity(vector.len());
        for (spec, &v) in self.fields.iter().zip(vector) {
            obs.set(spec.key, v as f64 * spec.high);
        }
        Ok(obs)
    }

    pub fn describe(&self, vector: &[f32]) -> String {
        self.fields
            .iter()
            .zip(vector)
            .map(|(spec, v)| format!("{}={:.2e}", spec.key, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

// =============================================================================
// Action Space
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpace {
    names: Vec<&'static str>,
}

impl ActionSpace {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let names = names
            .iter()
            .map(|n| {
                catalog::action_key(n.as_ref())
                    .ok_or_else(|| EnvError::UnknownAction(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn name(&self, index: usize) -> Result<&'static str> {
        self.names.get(index).copied().ok_or(EnvError::ActionIndex {
            index,
            len: self.names.len(),
        })
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| EnvError::UnknownAction(name.to_string()))
    }
}
