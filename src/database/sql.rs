//! SQL statements issued by the bootstrap helper

/// Quote an identifier (`"` doubled)
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal (`'` doubled)
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn role_exists(user: &str) -> String {
    format!("SELECT 1 FROM pg_roles WHERE rolname = {}", literal(user))
}

pub fn database_exists(name: &str) -> String {
    format!("SELECT 1 FROM pg_database WHERE datname = {}", literal(name))
}

pub fn create_role(user: &str, password: &str) -> String {
    format!(
        "CREATE ROLE {} WITH LOGIN PASSWORD {}",
        ident(user),
        literal(password)
    )
}

pub fn alter_role(user: &str, password: &str) -> String {
    format!(
        "ALTER ROLE {} WITH LOGIN PASSWORD {}",
        ident(user),
        literal(password)
    )
}

pub fn drop_role(user: &str) -> String {
    format!("DROP ROLE {}", ident(user))
}

pub fn create_database(name: &str, owner: &str) -> String {
    format!("CREATE DATABASE {} OWNER {}", ident(name), ident(owner))
}

pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", ident(name))
}

pub fn create_extension(extension: &str) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS {}", ident(extension))
}

pub const RELOAD_CONF: &str = "SELECT pg_reload_conf()";
