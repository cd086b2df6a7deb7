//! Translation of DataFusion filters into conditions a table script can use.
//!
//! Only simple comparisons between one column of the table and one literal
//! are kept. Anything else is left out of the condition list, which only costs
//! a pushdown opportunity since the engine applies every filter again on the
//! rows the scan returns.

use datafusion::common::ScalarValue;
use datafusion::logical_expr::{BinaryExpr, Expr, Like};

use crate::codec::encode;
use crate::operator::{ConditionOperator, OperatorCatalog, LIKE_OPERATOR};
use crate::types::{ColumnDescriptor, LogicalType};
use crate::value::ScriptValue;

/// A pushed-down comparison `column <operator> literal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: ConditionOperator,
    pub logical_type: LogicalType,
    pub literal: String,
}

impl Condition {
    /// The `{column, operator, type, constant}` table handed to scripts.
    pub fn to_script_value(&self) -> ScriptValue {
        ScriptValue::table([
            ("column", ScriptValue::from(self.column.as_str())),
            ("operator", ScriptValue::from(self.operator.name())),
            ("type", ScriptValue::from(self.logical_type.name())),
            ("constant", ScriptValue::from(self.literal.as_str())),
        ])
    }
}

/// Translates filters into conditions, in input order.
pub fn translate(
    filters: &[Expr],
    columns: &[ColumnDescriptor],
    catalog: &OperatorCatalog,
) -> Vec<Condition> {
    filters
        .iter()
        .filter_map(|expr| translate_expr(expr, columns, catalog))
        .collect()
}

/// Returns whether a single filter would be translated into a condition.
pub fn is_pushable(expr: &Expr, columns: &[ColumnDescriptor], catalog: &OperatorCatalog) -> bool {
    translate_expr(expr, columns, catalog).is_some()
}

fn translate_expr(
    expr: &Expr,
    columns: &[ColumnDescriptor],
    catalog: &OperatorCatalog,
) -> Option<Condition> {
    match expr {
        Expr::BinaryExpr(BinaryExpr { left, op, right }) => {
            let name = op.to_string();
            if let (Some(column), Some(literal)) = (column_of(left, columns), literal_of(right)) {
                return condition(column, &name, literal, catalog);
            }
            let (literal, column) = (literal_of(left)?, column_of(right, columns)?);
            // literal on the left: flip the operator so the column comes first
            let name = catalog.commutator(&name)?;
            condition(column, name, literal, catalog)
        }
        Expr::Like(Like {
            negated: false,
            expr,
            pattern,
            escape_char: None,
            case_insensitive: false,
        }) => {
            let column = column_of(expr, columns)?;
            let literal = literal_of(pattern)?;
            condition(column, LIKE_OPERATOR, literal, catalog)
        }
        _ => None,
    }
}

fn condition(
    column: &ColumnDescriptor,
    operator_name: &str,
    literal: &ScalarValue,
    catalog: &OperatorCatalog,
) -> Option<Condition> {
    let logical_type = LogicalType::of(&literal.data_type())?;
    let operator = catalog.lookup(operator_name, logical_type)?;
    let literal = encode(literal).ok().flatten()?;
    Some(Condition {
        column: column.name().to_string(),
        operator,
        logical_type,
        literal,
    })
}

fn column_of<'a>(expr: &Expr, columns: &'a [ColumnDescriptor]) -> Option<&'a ColumnDescriptor> {
    match expr {
        Expr::Column(column) => columns.iter().find(|c| c.name() == column.name),
        _ => None,
    }
}

fn literal_of(expr: &Expr) -> Option<&ScalarValue> {
    match expr {
        Expr::Literal(value) if !value.is_null() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::datatypes::{DataType, TimeUnit};
    use datafusion::prelude::{col, lit};

    use super::*;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::try_new("age", DataType::Int64).unwrap(),
            ColumnDescriptor::try_new("name", DataType::Utf8).unwrap(),
            ColumnDescriptor::try_new("score", DataType::Float64).unwrap(),
            ColumnDescriptor::try_new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, None),
            )
            .unwrap(),
        ]
    }

    fn condition(
        column: &str,
        operator: ConditionOperator,
        logical_type: LogicalType,
        literal: &str,
    ) -> Condition {
        Condition {
            column: column.to_string(),
            operator,
            logical_type,
            literal: literal.to_string(),
        }
    }

    #[test]
    fn test_translate_mixed_filters() {
        let filters = vec![
            col("age").eq(lit(30i64)),
            col("name").like(lit("A%")),
            col("age").gt(lit(10i64)).or(col("age").lt(lit(5i64))),
        ];
        let conditions = translate(&filters, &columns(), &OperatorCatalog::default());
        assert_eq!(
            conditions,
            vec![
                condition("age", ConditionOperator::Eq, LogicalType::Integer, "30"),
                condition("name", ConditionOperator::Like, LogicalType::Text, "A%"),
            ]
        );
    }

    #[test]
    fn test_translate_literal_on_left() {
        let filters = vec![lit(10i64).lt(col("age")), lit("x").eq(col("name"))];
        let conditions = translate(&filters, &columns(), &OperatorCatalog::default());
        assert_eq!(
            conditions,
            vec![
                condition("age", ConditionOperator::Gt, LogicalType::Integer, "10"),
                condition("name", ConditionOperator::Eq, LogicalType::Text, "x"),
            ]
        );
    }

    #[test]
    fn test_translate_keeps_order_and_duplicates() {
        let filters = vec![
            col("age").lt(lit(3i64)),
            col("age").lt(lit(3i64)),
            col("created_at").gt(lit(ScalarValue::TimestampMicrosecond(
                Some(1_704_103_200_000_000),
                None,
            ))),
        ];
        let conditions = translate(&filters, &columns(), &OperatorCatalog::default());
        assert_eq!(
            conditions,
            vec![
                condition("age", ConditionOperator::Lt, LogicalType::Integer, "3"),
                condition("age", ConditionOperator::Lt, LogicalType::Integer, "3"),
                condition(
                    "created_at",
                    ConditionOperator::Gt,
                    LogicalType::Timestamp,
                    "2024-01-01 10:00:00"
                ),
            ]
        );
    }

    #[test]
    fn test_translate_excludes_unsupported_shapes() {
        let catalog = OperatorCatalog::default();
        let columns = columns();
        let excluded = vec![
            col("age").not_eq(lit(1i64)),
            col("age").lt_eq(lit(1i64)),
            col("score").eq(lit(1.5f64)),
            col("name").lt(lit("b")),
            col("missing").eq(lit(1i64)),
            col("age").eq(col("age")),
            lit(1i64).eq(lit(1i64)),
            col("age").eq(lit(ScalarValue::Int64(None))),
            col("name").not_like(lit("A%")),
            col("name").ilike(lit("a%")),
            lit("A%").like(col("name")),
            Expr::Like(Like::new(
                false,
                Box::new(col("name")),
                Box::new(lit("A!%")),
                Some('!'),
                false,
            )),
            col("age").is_null(),
            col("age").eq(lit(1i64)).and(col("name").eq(lit("x"))),
        ];
        for expr in &excluded {
            assert!(!is_pushable(expr, &columns, &catalog), "{expr}");
        }
        assert!(translate(&excluded, &columns, &catalog).is_empty());
    }

    #[test]
    fn test_custom_catalog() {
        let mut catalog = OperatorCatalog::default();
        catalog.register("=", LogicalType::Float, ConditionOperator::Eq);
        let conditions = translate(&[col("score").eq(lit(1.5f64))], &columns(), &catalog);
        assert_eq!(
            conditions,
            vec![condition("score", ConditionOperator::Eq, LogicalType::Float, "1.5")]
        );
    }

    #[test]
    fn test_condition_script_value() {
        let value = condition("age", ConditionOperator::Eq, LogicalType::Integer, "30").to_script_value();
        assert_eq!(value.field("column").and_then(ScriptValue::as_str), Some("age"));
        assert_eq!(value.field("operator").and_then(ScriptValue::as_str), Some("eq"));
        assert_eq!(value.field("type").and_then(ScriptValue::as_str), Some("integer"));
        assert_eq!(value.field("constant").and_then(ScriptValue::as_str), Some("30"));
    }
}
