use std::{collections::BTreeMap, fmt};

/// The cost reported by a single training iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Cost {
    Scalar(f32),
    /// One cost per named objective, e.g. the terms of a composite loss.
    Named(BTreeMap<String, f32>),
}

impl Cost {
    /// Builds a `Cost::Named` out of `(name, value)` pairs.
    pub fn named<I, S>(costs: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        Self::Named(
            costs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Returns the scalar cost, or the sum of every named cost.
    pub fn total(&self) -> f32 {
        match self {
            Cost::Scalar(x) => *x,
            Cost::Named(costs) => costs.values().sum(),
        }
    }

    /// Returns the cost named `name`; a scalar cost has no names.
    pub fn get(&self, name: &str) -> Option<f32> {
        match self {
            Cost::Scalar(_) => None,
            Cost::Named(costs) => costs.get(name).copied(),
        }
    }
}

impl From<f32> for Cost {
    fn from(value: f32) -> Self {
        Cost::Scalar(value)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cost::Scalar(x) => write!(f, "{x}"),
            Cost::Named(costs) => {
                let mut first = true;
                for (name, value) in costs {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={value}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_total_is_itself() {
        let cost = Cost::from(0.25);
        assert_eq!(cost.total(), 0.25);
        assert_eq!(cost.get("loss"), None);
        assert_eq!(cost.to_string(), "0.25");
    }

    #[test]
    fn named_total_sums_every_term() {
        let cost = Cost::named([("reconstruction", 1.5), ("kl", 0.5)]);
        assert_eq!(cost.total(), 2.0);
        assert_eq!(cost.get("kl"), Some(0.5));
        assert_eq!(cost.get("adversarial"), None);
        assert_eq!(cost.to_string(), "kl=0.5, reconstruction=1.5");
    }
}
