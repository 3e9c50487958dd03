use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};

use crate::schema::Projects;

/// SELECT name FROM projects WHERE key = ?
pub fn select_by_key(key: &str) -> String {
    Query::select()
        .column(Projects::Name)
        .from(Projects::Table)
        .and_where(Expr::col(Projects::Key).eq(key))
        .to_string(SqliteQueryBuilder)
}

/// INSERT INTO projects (key, name) VALUES (?, ?) ON CONFLICT (key) DO NOTHING
pub fn insert_or_ignore(key: &str, name: &str) -> String {
    Query::insert()
        .into_table(Projects::Table)
        .columns([Projects::Key, Projects::Name])
        .values_panic([key.into(), name.into()])
        .on_conflict(OnConflict::column(Projects::Key).do_nothing().to_owned())
        .to_string(SqliteQueryBuilder)
}

/// SELECT 1 FROM projects WHERE key = ? (for existence check)
pub fn exists(key: &str) -> String {
    Query::select()
        .expr(Expr::val(1))
        .from(Projects::Table)
        .and_where(Expr::col(Projects::Key).eq(key))
        .to_string(SqliteQueryBuilder)
}
