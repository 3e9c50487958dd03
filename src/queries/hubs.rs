use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use crate::schema::Hubs;

/// INSERT INTO hubs (uuid, name, project_key) VALUES (?, ?, ?)
pub fn insert(uuid: &str, name: &str, project_key: &str) -> String {
    Query::insert()
        .into_table(Hubs::Table)
        .columns([Hubs::Uuid, Hubs::Name, Hubs::ProjectKey])
        .values_panic([uuid.into(), name.into(), project_key.into()])
        .to_string(SqliteQueryBuilder)
}

/// SELECT name, project_key FROM hubs WHERE uuid = ?
pub fn select_by_uuid(uuid: &str) -> String {
    Query::select()
        .columns([Hubs::Name, Hubs::ProjectKey])
        .from(Hubs::Table)
        .and_where(Expr::col(Hubs::Uuid).eq(uuid))
        .to_string(SqliteQueryBuilder)
}

/// SELECT uuid, name FROM hubs WHERE project_key = ? ORDER BY uuid
pub fn select_by_project(project_key: &str) -> String {
    Query::select()
        .columns([Hubs::Uuid, Hubs::Name])
        .from(Hubs::Table)
        .and_where(Expr::col(Hubs::ProjectKey).eq(project_key))
        .order_by(Hubs::Uuid, Order::Asc)
        .to_string(SqliteQueryBuilder)
}
