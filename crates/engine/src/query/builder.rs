//! Statement construction using SeaQuery.
//!
//! A [`ResourceQuery`] holds everything resolved for one request: compiled
//! predicates, ordering, normalized pagination and pinned identities. The
//! count and data statements share one `WHERE` builder over the same
//! compiled conditions.

use sea_query::{
    Alias, Asterisk, Expr, ExprTrait, NullOrdering, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, Values,
};
use uuid::Uuid;

use super::descriptor::{Counting, Direction, Field, JoinKind, ResourceDescriptor};
use super::order::{self, OrderClause};
use super::pagination::Pagination;
use super::predicate::{self, CompiledPredicates};
use super::search::RANK_ALIAS;
use super::types::FilterSpec;
use crate::error::EngineResult;

/// Output column flagging pinned rows.
pub const PINNED_ALIAS: &str = "pinned";

/// A fully resolved query against one resource.
#[derive(Debug, Clone)]
pub struct ResourceQuery<'a> {
    descriptor: &'a ResourceDescriptor,
    predicates: CompiledPredicates,
    ordering: Vec<OrderClause>,
    pagination: Pagination,
    pinned: Vec<Uuid>,
}

impl<'a> ResourceQuery<'a> {
    /// Resolve `spec` against `descriptor`. Pagination is normalized here,
    /// before anything runs.
    pub fn plan(
        descriptor: &'a ResourceDescriptor,
        spec: &FilterSpec,
        language: &str,
    ) -> EngineResult<Self> {
        let predicates = predicate::compile(descriptor, spec, language)?;
        let ordering = order::resolve(descriptor, &spec.sort, predicates.ranked());
        let pagination = Pagination::normalize(
            spec.page,
            spec.limit,
            descriptor.default_limit,
            descriptor.max_limit,
        );

        let pinned = if descriptor.pin.is_some() {
            dedup_pins(&spec.pinned)
        } else {
            if !spec.pinned.is_empty() {
                tracing::debug!(resource = descriptor.name, "resource does not support pinning");
            }
            Vec::new()
        };

        Ok(Self {
            descriptor,
            predicates,
            ordering,
            pagination,
            pinned,
        })
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        self.descriptor
    }

    pub fn predicates(&self) -> &CompiledPredicates {
        &self.predicates
    }

    pub fn ordering(&self) -> &[OrderClause] {
        &self.ordering
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// `SELECT COUNT(..)` over the filtered relation.
    pub fn count_statement(&self) -> SelectStatement {
        let mut query = Query::select();
        match self.descriptor.counting {
            Counting::Rows => {
                query.expr(Expr::col(Asterisk).count());
            }
            Counting::Distinct(field) => {
                query.expr(Expr::cust(format!("COUNT(DISTINCT {})", field.sql())));
            }
        }
        self.add_source(&mut query);
        self.add_conditions(&mut query);
        query
    }

    /// The page of rows, ordered and limited.
    pub fn data_statement(&self) -> SelectStatement {
        let mut query = Query::select();

        for selection in self.descriptor.columns {
            match selection.alias {
                Some(alias) => {
                    query.expr_as(selection.field.expr(), Alias::new(alias));
                }
                None => {
                    query.expr(selection.field.expr());
                }
            }
        }
        if let Some(rank) = &self.predicates.rank {
            query.expr_as(rank.clone(), Alias::new(RANK_ALIAS));
        }
        if let Some(pin) = self.descriptor.pin {
            query.expr_as(self.pinned_flag(&pin), Alias::new(PINNED_ALIAS));
        }

        self.add_source(&mut query);
        self.add_conditions(&mut query);

        if !self.descriptor.group_by.is_empty() {
            query.add_group_by(self.descriptor.group_by.iter().map(Field::expr));
        }

        if let (Some(pin), false) = (self.descriptor.pin, self.pinned.is_empty()) {
            query.order_by_expr(self.pinned_position(&pin), Order::Asc);
        }
        self.add_ordering(&mut query);

        query.limit(u64::from(self.pagination.limit));
        query.offset(self.pagination.offset());
        query
    }

    /// Count statement as SQL text plus positional values.
    pub fn build_count(&self) -> (String, Values) {
        self.count_statement().build(PostgresQueryBuilder)
    }

    /// Data statement as SQL text plus positional values.
    pub fn build_data(&self) -> (String, Values) {
        self.data_statement().build(PostgresQueryBuilder)
    }

    fn add_source(&self, query: &mut SelectStatement) {
        match self.descriptor.alias {
            Some(alias) => {
                query.from_as(Alias::new(self.descriptor.table), Alias::new(alias));
            }
            None => {
                query.from(Alias::new(self.descriptor.table));
            }
        }
        for join in self.descriptor.joins {
            let join_type = match join.kind {
                JoinKind::Inner => sea_query::JoinType::InnerJoin,
                JoinKind::Left => sea_query::JoinType::LeftJoin,
            };
            query.join_as(
                join_type,
                Alias::new(join.table),
                Alias::new(join.alias),
                Expr::cust(join.on),
            );
        }
    }

    fn add_conditions(&self, query: &mut SelectStatement) {
        for condition in &self.predicates.conditions {
            query.and_where(condition.expr.clone());
        }
    }

    fn add_ordering(&self, query: &mut SelectStatement) {
        for clause in &self.ordering {
            match clause {
                OrderClause::Relevance => {
                    query.order_by(Alias::new(RANK_ALIAS), Order::Desc);
                }
                OrderClause::Term(term) => {
                    let order = match term.direction {
                        Direction::Asc => Order::Asc,
                        Direction::Desc => Order::Desc,
                    };
                    if term.nulls_last {
                        query.order_by_expr_with_nulls(
                            term.field.expr(),
                            order,
                            NullOrdering::Last,
                        );
                    } else {
                        query.order_by_expr(term.field.expr(), order);
                    }
                }
            }
        }
    }

    /// `pin IN (...)`, or `FALSE` when nothing is pinned.
    fn pinned_flag(&self, pin: &Field) -> SimpleExpr {
        if self.pinned.is_empty() {
            return Expr::cust("FALSE");
        }
        pin.expr().is_in(self.pinned.iter().copied())
    }

    /// `CASE pin WHEN $1 THEN 0 WHEN $2 THEN 1 ... ELSE n END`, keeping the
    /// caller's order among pinned rows.
    fn pinned_position(&self, pin: &Field) -> SimpleExpr {
        let mut sql = format!("CASE {}", pin.sql());
        for (i, _) in self.pinned.iter().enumerate() {
            sql.push_str(&format!(" WHEN ${} THEN {i}", i + 1));
        }
        sql.push_str(&format!(" ELSE {} END", self.pinned.len()));
        Expr::cust_with_values(sql, self.pinned.iter().copied())
    }
}

fn dedup_pins(ids: &[Uuid]) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}
