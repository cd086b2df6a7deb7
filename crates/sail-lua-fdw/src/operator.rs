use std::collections::HashMap;
use std::fmt;

use datafusion::logical_expr::Operator;

use crate::types::LogicalType;

/// The operator name used for `LIKE`, matching DataFusion's spelling of
/// [`Operator::LikeMatch`].
pub const LIKE_OPERATOR: &str = "~~";

/// The comparison a pushed-down condition asks the script to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Eq,
    Lt,
    Gt,
    Like,
}

impl ConditionOperator {
    /// The name published to scripts.
    pub fn name(&self) -> &'static str {
        match self {
            ConditionOperator::Eq => "eq",
            ConditionOperator::Lt => "lt",
            ConditionOperator::Gt => "gt",
            ConditionOperator::Like => "like",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Recognized comparison operators, keyed by canonical operator name and the
/// logical type of the compared literal.
///
/// Names are the engine's operator spellings (`=`, `<`, `>`, `~~`), so
/// recognition does not depend on any numeric operator identity.
#[derive(Debug, Clone)]
pub struct OperatorCatalog {
    operators: HashMap<(String, LogicalType), ConditionOperator>,
    commutators: HashMap<String, String>,
}

impl OperatorCatalog {
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
            commutators: HashMap::new(),
        }
    }

    /// Registers an operator for a logical type, returning the operator it
    /// replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        logical_type: LogicalType,
        operator: ConditionOperator,
    ) -> Option<ConditionOperator> {
        self.operators.insert((name.into(), logical_type), operator)
    }

    /// Records that `a x b` is equivalent to `b y a`, in both directions.
    pub fn register_commutator(&mut self, x: impl Into<String>, y: impl Into<String>) {
        let (x, y) = (x.into(), y.into());
        self.commutators.insert(x.clone(), y.clone());
        self.commutators.insert(y, x);
    }

    pub fn lookup(&self, name: &str, logical_type: LogicalType) -> Option<ConditionOperator> {
        self.operators
            .get(&(name.to_string(), logical_type))
            .copied()
    }

    pub fn commutator(&self, name: &str) -> Option<&str> {
        self.commutators.get(name).map(String::as_str)
    }
}

impl Default for OperatorCatalog {
    fn default() -> Self {
        let eq = Operator::Eq.to_string();
        let lt = Operator::Lt.to_string();
        let gt = Operator::Gt.to_string();
        let mut catalog = Self::empty();
        for logical_type in [LogicalType::Integer, LogicalType::Timestamp] {
            catalog.register(eq.as_str(), logical_type, ConditionOperator::Eq);
            catalog.register(lt.as_str(), logical_type, ConditionOperator::Lt);
            catalog.register(gt.as_str(), logical_type, ConditionOperator::Gt);
        }
        catalog.register(eq.as_str(), LogicalType::Text, ConditionOperator::Eq);
        catalog.register(LIKE_OPERATOR, LogicalType::Text, ConditionOperator::Like);
        catalog.register_commutator(eq.as_str(), eq.as_str());
        catalog.register_commutator(lt, gt);
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = OperatorCatalog::default();
        assert_eq!(
            catalog.lookup("=", LogicalType::Integer),
            Some(ConditionOperator::Eq)
        );
        assert_eq!(
            catalog.lookup(">", LogicalType::Timestamp),
            Some(ConditionOperator::Gt)
        );
        assert_eq!(
            catalog.lookup(&Operator::LikeMatch.to_string(), LogicalType::Text),
            Some(ConditionOperator::Like)
        );
        assert_eq!(catalog.lookup("<", LogicalType::Text), None);
        assert_eq!(catalog.lookup("=", LogicalType::Float), None);
        assert_eq!(catalog.lookup("<=", LogicalType::Integer), None);
    }

    #[test]
    fn test_commutators() {
        let catalog = OperatorCatalog::default();
        assert_eq!(catalog.commutator("="), Some("="));
        assert_eq!(catalog.commutator("<"), Some(">"));
        assert_eq!(catalog.commutator(">"), Some("<"));
        assert_eq!(catalog.commutator(LIKE_OPERATOR), None);
    }

    #[test]
    fn test_register() {
        let mut catalog = OperatorCatalog::default();
        assert_eq!(
            catalog.register("=", LogicalType::Date, ConditionOperator::Eq),
            None
        );
        assert_eq!(
            catalog.lookup("=", LogicalType::Date),
            Some(ConditionOperator::Eq)
        );
    }
}
