use super::*;
use std::cell::RefCell;
use std::collections::BTreeSet;

/// Minimal server model answering the statements the bootstrap issues
#[derive(Default)]
struct FakeServer {
    roles: RefCell<BTreeSet<String>>,
    databases: RefCell<BTreeSet<String>>,
    statements: RefCell<Vec<String>>,
}

fn quoted(sql: &str, quote: char) -> String {
    let start = sql.find(quote).unwrap() + 1;
    let end = sql[start..].find(quote).unwrap() + start;
    sql[start..end].to_string()
}

impl SqlRunner for FakeServer {
    fn query(&self, database: Option<&str>, sql: &str) -> Result<String> {
        self.statements.borrow_mut().push(match database {
            Some(db) => format!("[{}] {}", db, sql),
            None => sql.to_string(),
        });

        let found = |set: &RefCell<BTreeSet<String>>| {
            if set.borrow().contains(&quoted(sql, '\'')) {
                "1\n".to_string()
            } else {
                String::new()
            }
        };
        if sql.contains("FROM pg_roles") {
            return Ok(found(&self.roles));
        }
        if sql.contains("FROM pg_database") {
            return Ok(found(&self.databases));
        }
        if sql.starts_with("CREATE ROLE") {
            self.roles.borrow_mut().insert(quoted(sql, '"'));
        } else if sql.starts_with("DROP ROLE") {
            self.roles.borrow_mut().remove(&quoted(sql, '"'));
        } else if sql.starts_with("CREATE DATABASE") {
            let name = quoted(sql, '"');
            if !self.databases.borrow_mut().insert(name.clone()) {
                anyhow::bail!("database \"{}\" already exists", name);
            }
        } else if sql.starts_with("DROP DATABASE") {
            self.databases.borrow_mut().remove(&quoted(sql, '"'));
        }
        Ok(String::new())
    }
}

impl FakeServer {
    fn writes(&self) -> Vec<String> {
        self.statements
            .borrow()
            .iter()
            .filter(|s| !s.starts_with("SELECT 1"))
            .cloned()
            .collect()
    }
}

fn credentials() -> DbCredentials {
    DbCredentials {
        name: "vires".to_string(),
        user: "vires_admin".to_string(),
        password: "pw".to_string(),
        extensions: vec!["postgis".to_string()],
    }
}

#[test]
fn test_create_from_scratch() {
    let server = FakeServer::default();
    let outcome = Bootstrap::new(&server, None)
        .create(&credentials(), false)
        .unwrap();

    assert_eq!(outcome, CreateOutcome::Created);
    assert_eq!(
        server.writes(),
        vec![
            "CREATE ROLE \"vires_admin\" WITH LOGIN PASSWORD 'pw'",
            "CREATE DATABASE \"vires\" OWNER \"vires_admin\"",
            "[vires] CREATE EXTENSION IF NOT EXISTS \"postgis\"",
        ]
    );
}

#[test]
fn test_create_twice_without_force_changes_nothing() {
    let server = FakeServer::default();
    let bootstrap = Bootstrap::new(&server, None);
    bootstrap.create(&credentials(), false).unwrap();
    let writes = server.writes().len();

    let outcome = bootstrap.create(&credentials(), false).unwrap();
    assert_eq!(outcome, CreateOutcome::AlreadyExists);
    assert_eq!(server.writes().len(), writes);
    assert!(server.databases.borrow().contains("vires"));
    assert!(server.roles.borrow().contains("vires_admin"));
}

#[test]
fn test_create_with_force_recreates_database() {
    let server = FakeServer::default();
    let bootstrap = Bootstrap::new(&server, None);
    bootstrap.create(&credentials(), false).unwrap();

    let outcome = bootstrap.create(&credentials(), true).unwrap();
    assert_eq!(outcome, CreateOutcome::Created);
    let writes = server.writes();
    assert!(writes.contains(&"DROP DATABASE IF EXISTS \"vires\"".to_string()));
    assert!(writes.contains(&"ALTER ROLE \"vires_admin\" WITH LOGIN PASSWORD 'pw'".to_string()));
}

#[test]
fn test_create_updates_pg_hba_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let pg_hba = dir.path().join("pg_hba.conf");
    std::fs::write(&pg_hba, "local all postgres peer\n").unwrap();

    let server = FakeServer::default();
    Bootstrap::new(&server, Some(pg_hba.clone()))
        .create(&credentials(), false)
        .unwrap();

    let content = std::fs::read_to_string(&pg_hba).unwrap();
    assert!(content.starts_with("# BEGIN vires-deploy vires\n"));
    assert_eq!(server.writes().last().unwrap(), "SELECT pg_reload_conf()");
}

#[test]
fn test_restricted_database_stays_reachable_by_superuser() {
    let dir = tempfile::tempdir().unwrap();
    let pg_hba = dir.path().join("pg_hba.conf");
    std::fs::write(&pg_hba, "local all postgres peer\n").unwrap();

    let server = FakeServer::default();
    Bootstrap::new(&server, Some(pg_hba.clone()))
        .create(&credentials(), false)
        .unwrap();

    let content = std::fs::read_to_string(&pg_hba).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    let superuser = lines
        .iter()
        .position(|l| *l == "local   vires   postgres   peer")
        .unwrap();
    let reject = lines
        .iter()
        .position(|l| *l == "local   vires   all   reject")
        .unwrap();
    assert!(superuser < reject);
}

#[test]
fn test_pg_hba_follows_psql_superuser() {
    let dir = tempfile::tempdir().unwrap();
    let pg_hba = dir.path().join("pg_hba.conf");
    std::fs::write(&pg_hba, "").unwrap();

    // psql is never run, only the role name is used
    let psql = Psql::new("/nonexistent/bin/psql", "dba");
    assert_eq!(psql.superuser(), "dba");
    hba::edit_file(&pg_hba, "vires", Some("vires_admin"), psql.superuser()).unwrap();
    assert!(std::fs::read_to_string(&pg_hba)
        .unwrap()
        .contains("local   vires   dba   peer"));
}

#[test]
fn test_drop_missing_user_is_ok() {
    let server = FakeServer::default();
    Bootstrap::new(&server, None)
        .drop_user("nobody", Some("nothing"))
        .unwrap();
    assert!(server.writes().is_empty());
}

#[test]
fn test_drop_user_and_database() {
    let dir = tempfile::tempdir().unwrap();
    let pg_hba = dir.path().join("pg_hba.conf");
    std::fs::write(&pg_hba, "local all postgres peer\n").unwrap();

    let server = FakeServer::default();
    let bootstrap = Bootstrap::new(&server, Some(pg_hba.clone()));
    bootstrap.create(&credentials(), false).unwrap();

    bootstrap.drop_user("vires_admin", Some("vires")).unwrap();
    assert!(server.roles.borrow().is_empty());
    assert!(server.databases.borrow().is_empty());
    assert_eq!(
        std::fs::read_to_string(&pg_hba).unwrap(),
        "local all postgres peer\n"
    );
}

#[test]
fn test_psql_command_line() {
    let psql = Psql::default();
    let cmd = psql.command(Some("vires"), "SELECT 1");
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect();
    assert_eq!(cmd.get_program(), "psql");
    assert_eq!(
        args,
        vec![
            "-X",
            "-q",
            "-v",
            "ON_ERROR_STOP=1",
            "-tA",
            "-U",
            "postgres",
            "-d",
            "vires",
            "-c",
            "SELECT 1"
        ]
    );
}

#[test]
fn test_psql_missing_program() {
    let psql = Psql::new("/nonexistent/bin/psql", "postgres");
    let err = psql.query(None, "SELECT 1").unwrap_err();
    assert!(err.to_string().contains("Failed to execute"));
}
