use crate::ast::{
    AggOp, ColUnit, Condition, Conditions, OrderItem, Query, SetOp, TableUnit, ValUnit, Value,
};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::schema::{column_id, Schema, ALL_COLUMNS};
use crate::ParseError;
use std::collections::HashMap;

/// Deepest nesting of parentheses, subqueries and set operations accepted.
pub const MAX_NESTING: usize = 100;

const RESERVED: &[&str] = &[
    "select", "from", "where", "group", "by", "having", "order", "limit", "offset", "on", "as",
    "join", "inner", "left", "right", "full", "outer", "cross", "natural", "union", "intersect",
    "except", "and", "or", "not", "in", "like", "between", "is", "exists", "asc", "desc",
    "distinct", "null",
];

#[derive(Debug, Clone)]
enum Source {
    Table(String),
    Derived,
}

#[derive(Debug, Default)]
struct Scope {
    sources: Vec<(String, Source)>,
    select_aliases: HashMap<String, ValUnit>,
}

/// Parse one SQL statement into a schema-resolved [`Query`].
pub fn parse(sql: &str, schema: &Schema) -> Result<Query, ParseError> {
    let mut parser = Parser {
        tokens: tokenize(sql)?,
        pos: 0,
        schema,
        scopes: Vec::new(),
        depth: 0,
    };
    let query = parser.parse_query()?;
    parser.eat(&TokenKind::Semicolon);
    match parser.peek().kind {
        TokenKind::Eof => Ok(query),
        _ => Err(parser.unexpected("end of statement")),
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    schema: &'a Schema,
    scopes: Vec<Scope>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek().is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ParseError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ParseError> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("keyword {}", word.to_uppercase())))
        }
    }

    /// Run `parse` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::new(
                self.peek().offset,
                format!("nesting deeper than {} levels", MAX_NESTING),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(
            token.offset,
            format!("expected {}, found {:?}", expected, token.kind),
        )
    }

    fn starts_subquery(&self) -> bool {
        self.peek().kind == TokenKind::LParen && self.peek_at(1).is_word("select")
    }

    fn peek_identifier(&self) -> Option<String> {
        match &self.peek().kind {
            TokenKind::Word(w) if !RESERVED.contains(&w.as_str()) => Some(w.clone()),
            TokenKind::QuotedIdent(w) => Some(w.clone()),
            _ => None,
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match self.peek_identifier() {
            Some(name) => {
                self.advance();
                Ok(name)
            }
            None => Err(self.unexpected("identifier")),
        }
    }

    fn parse_query(&mut self) -> Result<Query, ParseError> {
        let mut query = if self.starts_subquery() {
            self.advance();
            let inner = self.nested(|p| p.parse_query())?;
            self.expect(TokenKind::RParen, ")")?;
            inner
        } else {
            self.parse_select()?
        };

        let op = match &self.peek().kind {
            TokenKind::Word(w) if w == "union" => Some(SetOp::Union),
            TokenKind::Word(w) if w == "intersect" => Some(SetOp::Intersect),
            TokenKind::Word(w) if w == "except" => Some(SetOp::Except),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            self.eat_word("all");
            let rest = self.nested(|p| p.parse_query())?;
            query.compound = Some((op, Box::new(rest)));
        }
        Ok(query)
    }

    /// Index of the `FROM` belonging to the select starting at the cursor.
    fn find_from(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(self.pos) {
            match &token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => return None,
                TokenKind::RParen => depth -= 1,
                TokenKind::Eof => return None,
                TokenKind::Word(w) if depth == 0 => match w.as_str() {
                    "from" => return Some(i),
                    "union" | "intersect" | "except" => return None,
                    _ => {}
                },
                _ => {}
            }
        }
        None
    }

    fn parse_select(&mut self) -> Result<Query, ParseError> {
        self.expect_word("select")?;
        let distinct = self.eat_word("distinct");
        self.eat_word("all");

        let select_start = self.pos;
        let from_pos = self.find_from().ok_or_else(|| {
            ParseError::new(self.peek().offset, "SELECT without FROM is not supported")
        })?;

        self.scopes.push(Scope::default());
        let result = self.parse_select_body(distinct, select_start, from_pos);
        self.scopes.pop();
        result
    }

    fn parse_select_body(
        &mut self,
        distinct: bool,
        select_start: usize,
        from_pos: usize,
    ) -> Result<Query, ParseError> {
        // tables first so select items can resolve unqualified columns
        self.pos = from_pos + 1;
        let (from, join_conditions) = self.parse_from()?;
        let after_from = self.pos;

        self.pos = select_start;
        let mut select = Vec::new();
        loop {
            let unit = self.parse_val_unit()?;
            let alias = if self.eat_word("as") {
                match self.peek().kind.clone() {
                    TokenKind::Str(s) => {
                        self.advance();
                        Some(s.to_lowercase())
                    }
                    _ => Some(self.identifier()?),
                }
            } else if self.pos < from_pos {
                self.peek_identifier().inspect(|_| {
                    self.advance();
                })
            } else {
                None
            };
            if let (Some(alias), Some(scope)) = (alias, self.scopes.last_mut()) {
                scope.select_aliases.insert(alias, unit.clone());
            }
            select.push(unit);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if self.pos != from_pos {
            return Err(self.unexpected("FROM"));
        }
        self.pos = after_from;

        let filter = if self.eat_word("where") {
            self.parse_conditions()?
        } else {
            Conditions::default()
        };

        let mut group_by = Vec::new();
        if self.eat_word("group") {
            self.expect_word("by")?;
            loop {
                group_by.push(self.parse_col_unit()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let having = if self.eat_word("having") {
            self.parse_conditions()?
        } else {
            Conditions::default()
        };

        let mut order_by = Vec::new();
        if self.eat_word("order") {
            self.expect_word("by")?;
            loop {
                let unit = self.parse_val_unit()?;
                let descending = if self.eat_word("desc") {
                    true
                } else {
                    self.eat_word("asc");
                    false
                };
                order_by.push(OrderItem { unit, descending });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let mut limit = None;
        if self.eat_word("limit") {
            match self.advance().kind {
                TokenKind::Number(n) => limit = Some(n),
                _ => return Err(self.unexpected("LIMIT count")),
            }
            if self.eat_word("offset") || self.eat(&TokenKind::Comma) {
                self.advance();
            }
        }

        Ok(Query {
            distinct,
            select,
            from,
            join_conditions,
            filter,
            group_by,
            having,
            order_by,
            limit,
            compound: None,
        })
    }

    fn parse_from(&mut self) -> Result<(Vec<TableUnit>, Vec<Condition>), ParseError> {
        let mut units = Vec::new();
        let mut joins = Vec::new();
        loop {
            units.push(self.parse_table_unit()?);
            if self.eat_word("on") {
                loop {
                    joins.push(self.parse_condition()?);
                    if !self.eat_word("and") {
                        break;
                    }
                }
            }
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            let mut saw_modifier = false;
            while ["inner", "left", "right", "full", "outer", "cross", "natural"]
                .iter()
                .any(|w| self.peek().is_word(w))
            {
                self.advance();
                saw_modifier = true;
            }
            if self.eat_word("join") {
                continue;
            }
            if saw_modifier {
                return Err(self.unexpected("JOIN"));
            }
            break;
        }
        Ok((units, joins))
    }

    fn parse_table_unit(&mut self) -> Result<TableUnit, ParseError> {
        if self.starts_subquery() {
            self.advance();
            let query = self.nested(|p| p.parse_query())?;
            self.expect(TokenKind::RParen, ")")?;
            if let Some(alias) = self.parse_alias()? {
                self.register(alias, Source::Derived);
            }
            return Ok(TableUnit::Query(Box::new(query)));
        }

        let offset = self.peek().offset;
        let name = self.identifier()?;
        if self.schema.table(&name).is_none() {
            return Err(ParseError::new(offset, format!("unknown table {}", name)));
        }
        let alias = self.parse_alias()?;
        self.register(name.clone(), Source::Table(name.clone()));
        if let Some(alias) = alias {
            self.register(alias, Source::Table(name.clone()));
        }
        Ok(TableUnit::Table(name))
    }

    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.eat_word("as") {
            return self.identifier().map(Some);
        }
        Ok(self.peek_identifier().inspect(|_| {
            self.advance();
        }))
    }

    fn register(&mut self, name: String, source: Source) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.sources.push((name, source));
        }
    }

    fn parse_val_unit(&mut self) -> Result<ValUnit, ParseError> {
        if let Some(alias) = self.select_alias() {
            self.advance();
            return Ok(alias);
        }
        let left = self.parse_col_unit()?;
        let op = match &self.peek().kind {
            TokenKind::Op(op @ ("+" | "-" | "/" | "%" | "||")) => Some(*op),
            TokenKind::Star => Some("*"),
            _ => None,
        };
        let op = match op {
            Some(op) => {
                self.advance();
                Some((op, self.parse_col_unit()?))
            }
            None => None,
        };
        Ok(ValUnit { left, op })
    }

    /// A bare identifier that names a select-list alias rather than a column.
    fn select_alias(&self) -> Option<ValUnit> {
        let name = self.peek_identifier()?;
        if matches!(
            self.peek_at(1).kind,
            TokenKind::Dot | TokenKind::LParen
        ) || self.column_in_scope(&name).is_some()
        {
            return None;
        }
        self.scopes.last()?.select_aliases.get(&name).cloned()
    }

    fn parse_col_unit(&mut self) -> Result<ColUnit, ParseError> {
        if self.peek().kind == TokenKind::LParen && !self.peek_at(1).is_word("select") {
            self.advance();
            let unit = self.nested(|p| p.parse_col_unit())?;
            self.expect(TokenKind::RParen, ")")?;
            return Ok(unit);
        }
        if self.eat_word("distinct") {
            let mut unit = self.nested(|p| p.parse_col_unit())?;
            unit.distinct = true;
            return Ok(unit);
        }
        if let TokenKind::Word(word) = &self.peek().kind {
            if self.peek_at(1).kind == TokenKind::LParen {
                let offset = self.peek().offset;
                let Some(agg) = AggOp::from_word(word) else {
                    return Err(ParseError::new(
                        offset,
                        format!("function {} is not supported", word),
                    ));
                };
                self.advance();
                self.advance();
                let distinct = self.eat_word("distinct");
                let column = self.parse_column()?;
                self.expect(TokenKind::RParen, ")")?;
                return Ok(ColUnit {
                    agg,
                    column,
                    distinct,
                });
            }
        }
        Ok(ColUnit::column(self.parse_column()?))
    }

    fn parse_column(&mut self) -> Result<String, ParseError> {
        if self.eat(&TokenKind::Star) {
            return Ok(ALL_COLUMNS.to_string());
        }
        let offset = self.peek().offset;
        let first = self.identifier()?;
        if self.eat(&TokenKind::Dot) {
            if self.eat(&TokenKind::Star) {
                return Ok(ALL_COLUMNS.to_string());
            }
            let column = self.identifier()?;
            return self.qualified_column(&first, &column).ok_or_else(|| {
                ParseError::new(offset, format!("unknown column {}.{}", first, column))
            });
        }
        self.column_in_scope(&first)
            .ok_or_else(|| ParseError::new(offset, format!("unknown column {}", first)))
    }

    fn qualified_column(&self, qualifier: &str, column: &str) -> Option<String> {
        for scope in self.scopes.iter().rev() {
            for (name, source) in &scope.sources {
                if name != qualifier {
                    continue;
                }
                return match source {
                    Source::Table(table) if self.schema.has_column(table, column) => {
                        Some(column_id(table, column))
                    }
                    Source::Table(_) => None,
                    Source::Derived => Some(column_id(qualifier, column)),
                };
            }
        }
        None
    }

    fn column_in_scope(&self, column: &str) -> Option<String> {
        for scope in self.scopes.iter().rev() {
            let mut derived = None;
            for (name, source) in &scope.sources {
                match source {
                    Source::Table(table) if self.schema.has_column(table, column) => {
                        return Some(column_id(table, column));
                    }
                    Source::Derived if derived.is_none() => derived = Some(name),
                    _ => {}
                }
            }
            if let Some(name) = derived {
                return Some(column_id(name, column));
            }
        }
        None
    }

    fn parse_conditions(&mut self) -> Result<Conditions, ParseError> {
        let mut out = Conditions::default();
        self.parse_condition_chain(&mut out)?;
        Ok(out)
    }

    fn parse_condition_chain(&mut self, out: &mut Conditions) -> Result<(), ParseError> {
        loop {
            if self.peek().kind == TokenKind::LParen && !self.peek_at(1).is_word("select") {
                self.advance();
                self.nested(|p| p.parse_condition_chain(out))?;
                self.expect(TokenKind::RParen, ")")?;
            } else {
                out.conditions.push(self.parse_condition()?);
            }
            if self.eat_word("and") {
                out.conjunctions.push("and");
            } else if self.eat_word("or") {
                out.conjunctions.push("or");
            } else {
                return Ok(());
            }
        }
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        let mut not = self.eat_word("not");
        if self.eat_word("exists") {
            if !self.starts_subquery() {
                return Err(self.unexpected("subquery after EXISTS"));
            }
            let right = self.parse_value()?;
            return Ok(Condition {
                not,
                op: "exists",
                left: None,
                right,
                right2: None,
            });
        }

        let left = self.parse_val_unit()?;
        if self.eat_word("not") {
            not = true;
        }
        let op = match &self.peek().kind {
            TokenKind::Op(op @ ("=" | "!=" | "<" | ">" | "<=" | ">=")) => *op,
            TokenKind::Word(w) => match w.as_str() {
                "between" => "between",
                "in" => "in",
                "like" => "like",
                "is" => "is",
                _ => return Err(self.unexpected("comparison operator")),
            },
            _ => return Err(self.unexpected("comparison operator")),
        };
        self.advance();
        if op == "is" && self.eat_word("not") {
            not = true;
        }

        let right = self.parse_value()?;
        let right2 = if op == "between" {
            self.expect_word("and")?;
            Some(self.parse_value()?)
        } else {
            None
        };
        Ok(Condition {
            not,
            op,
            left: Some(left),
            right,
            right2,
        })
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Number(_) | TokenKind::Str(_) => {
                self.advance();
                Ok(Value::Literal)
            }
            TokenKind::Op("-") if matches!(self.peek_at(1).kind, TokenKind::Number(_)) => {
                self.advance();
                self.advance();
                Ok(Value::Literal)
            }
            TokenKind::Word(w) if matches!(w.as_str(), "null" | "true" | "false") => {
                self.advance();
                Ok(Value::Literal)
            }
            TokenKind::LParen if self.peek_at(1).is_word("select") => {
                self.advance();
                let query = self.nested(|p| p.parse_query())?;
                self.expect(TokenKind::RParen, ")")?;
                Ok(Value::Query(Box::new(query)))
            }
            TokenKind::LParen => {
                self.advance();
                loop {
                    self.nested(|p| p.parse_value())?;
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, ")")?;
                Ok(Value::Literal)
            }
            _ => Ok(Value::Column(self.parse_col_unit()?)),
        }
    }
}
