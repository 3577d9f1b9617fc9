//! Spider-shaped query tree.
//!
//! Columns are stored already resolved against the schema as `__table.column__`
//! ids (or `__all__` for `*`), so two queries that name the same column through
//! different aliases produce the same tree.

use crate::schema::ForeignKeyMap;
use strum::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum AggOp {
    None,
    Max,
    Min,
    Count,
    Sum,
    Avg,
}

impl AggOp {
    pub fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "max" => Self::Max,
            "min" => Self::Min,
            "count" => Self::Count,
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColUnit {
    pub agg: AggOp,
    pub column: String,
    pub distinct: bool,
}

impl ColUnit {
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            agg: AggOp::None,
            column: column.into(),
            distinct: false,
        }
    }

    fn render(&self, keys: &ForeignKeyMap) -> String {
        let column = keys.resolve(&self.column);
        let distinct = if self.distinct { "distinct " } else { "" };
        match self.agg {
            AggOp::None => format!("{}{}", distinct, column),
            agg => format!("{}({}{})", agg, distinct, column),
        }
    }
}

/// One column unit, optionally combined arithmetically with a second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValUnit {
    pub left: ColUnit,
    pub op: Option<(&'static str, ColUnit)>,
}

impl ValUnit {
    fn render(&self, keys: &ForeignKeyMap) -> String {
        match &self.op {
            None => self.left.render(keys),
            Some((op, right)) => format!("{} {} {}", self.left.render(keys), op, right.render(keys)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Numbers, strings, `NULL` and literal lists all compare as "some value".
    Literal,
    Column(ColUnit),
    Query(Box<Query>),
}

impl Value {
    fn render(&self, keys: &ForeignKeyMap) -> String {
        match self {
            Value::Literal => "value".to_string(),
            Value::Column(col) => col.render(keys),
            Value::Query(query) => format!("({})", query.canonical(keys)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub not: bool,
    pub op: &'static str,
    /// Absent for `EXISTS (...)`.
    pub left: Option<ValUnit>,
    pub right: Value,
    /// Upper bound of `BETWEEN`.
    pub right2: Option<Value>,
}

impl Condition {
    fn render(&self, keys: &ForeignKeyMap) -> String {
        let mut out = String::new();
        if self.not {
            out.push_str("not ");
        }
        if let Some(left) = &self.left {
            out.push_str(&left.render(keys));
            out.push(' ');
        }
        out.push_str(self.op);
        out.push(' ');
        out.push_str(&self.right.render(keys));
        if let Some(right2) = &self.right2 {
            out.push_str(" and ");
            out.push_str(&right2.render(keys));
        }
        out
    }
}

/// Flattened `cond (and|or) cond ...` chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    pub conditions: Vec<Condition>,
    pub conjunctions: Vec<&'static str>,
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn render(&self, keys: &ForeignKeyMap) -> (Vec<String>, Vec<String>) {
        (
            sorted(self.conditions.iter().map(|c| c.render(keys))),
            sorted(self.conjunctions.iter().map(|c| c.to_string())),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableUnit {
    Table(String),
    Query(Box<Query>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub unit: ValUnit,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub distinct: bool,
    pub select: Vec<ValUnit>,
    pub from: Vec<TableUnit>,
    pub join_conditions: Vec<Condition>,
    pub filter: Conditions,
    pub group_by: Vec<ColUnit>,
    pub having: Conditions,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<String>,
    pub compound: Option<(SetOp, Box<Query>)>,
}

/// Component-wise normal form of a [`Query`]; two queries exactly match when
/// their canonical forms are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalQuery {
    pub distinct: bool,
    pub select: Vec<String>,
    pub from: Vec<String>,
    pub filter: (Vec<String>, Vec<String>),
    pub group_by: Vec<String>,
    pub having: (Vec<String>, Vec<String>),
    pub order_by: Vec<String>,
    pub has_limit: bool,
    pub compound: Option<(SetOp, Box<CanonicalQuery>)>,
}

impl std::fmt::Display for CanonicalQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "select{} {:?} from {:?} where {:?} group {:?} having {:?} order {:?} limit {}",
            if self.distinct { " distinct" } else { "" },
            self.select,
            self.from,
            self.filter,
            self.group_by,
            self.having,
            self.order_by,
            self.has_limit
        )?;
        if let Some((op, other)) = &self.compound {
            write!(f, " {} {}", op, other)?;
        }
        Ok(())
    }
}

impl Query {
    pub fn canonical(&self, keys: &ForeignKeyMap) -> CanonicalQuery {
        CanonicalQuery {
            distinct: self.distinct,
            select: sorted(self.select.iter().map(|v| v.render(keys))),
            from: sorted(self.from.iter().map(|t| match t {
                TableUnit::Table(name) => name.clone(),
                TableUnit::Query(q) => format!("({})", q.canonical(keys)),
            })),
            filter: self.filter.render(keys),
            group_by: sorted(self.group_by.iter().map(|c| c.render(keys))),
            having: self.having.render(keys),
            order_by: self
                .order_by
                .iter()
                .map(|item| {
                    let dir = if item.descending { "desc" } else { "asc" };
                    format!("{} {}", item.unit.render(keys), dir)
                })
                .collect(),
            has_limit: self.limit.is_some(),
            compound: self
                .compound
                .as_ref()
                .map(|(op, q)| (*op, Box::new(q.canonical(keys)))),
        }
    }
}

fn sorted(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut items: Vec<String> = items.collect();
    items.sort();
    items
}
