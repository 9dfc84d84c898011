use super::*;
use crate::engine::{fake::FakeEngine, EngineKind};
use std::fs;
use tempfile::TempDir;

fn deployment() -> (TempDir, Deployment) {
    let root = tempfile::tempdir().unwrap();
    fs::write(
        root.path().join("common.toml"),
        "[registration.collections]\nSW_OPER_MAGA_LR_1B = \"SW_OPER_MAGA_LR_1B_*.cdf\"\n",
    )
    .unwrap();
    fs::create_dir_all(root.path().join("swarm")).unwrap();
    fs::write(
        root.path().join("swarm/common.toml"),
        "container_name = \"vires-swarm\"\n",
    )
    .unwrap();
    let deployment = Deployment::load(root.path(), EngineKind::Podman).unwrap();
    (root, deployment)
}

fn products(dir: &Path) -> Vec<PathBuf> {
    let nested = dir.join("2024/01");
    fs::create_dir_all(&nested).unwrap();
    let files = vec![
        dir.join("SW_OPER_MAGA_LR_1B_20240101T000000_20240101T235959_0605.cdf"),
        nested.join("SW_OPER_MAGA_LR_1B_20240102T000000_20240102T235959_0605.cdf"),
    ];
    for file in &files {
        fs::write(file, b"").unwrap();
    }
    fs::write(dir.join("README.txt"), b"").unwrap();
    files
}

#[test]
fn test_selected_file() {
    assert_eq!(selected_file("register\t-\t-\tfileA.cdf"), Some("fileA.cdf"));
    assert_eq!(selected_file("update\t-\tfileB.cdf\t-"), Some("fileB.cdf"));
    assert_eq!(selected_file("skip\t-\t-\tfileC.cdf"), None);
    assert_eq!(selected_file("register\t-\t-"), None);
    assert_eq!(selected_file(""), None);
}

#[test]
fn test_filter_status() {
    let input = "register\t-\t-\tfileA.cdf\nupdate\t-\tfileB.cdf\t-\nskip\told\t-\tfileC.cdf\ngarbage\n";
    let mut selected = Vec::new();
    let mut rest = Vec::new();

    let count = filter_status(input.as_bytes(), &mut selected, &mut rest).unwrap();
    assert_eq!(count, 2);
    assert_eq!(String::from_utf8(selected).unwrap(), "fileA.cdf\nfileB.cdf\n");
    assert_eq!(
        String::from_utf8(rest).unwrap(),
        "skip\told\t-\tfileC.cdf\ngarbage\n"
    );
}

#[test]
fn test_discover_walks_directories() {
    let dir = tempfile::tempdir().unwrap();
    let mut expected = products(dir.path());
    expected.sort();

    let found = discover(&[dir.path().to_path_buf()], "SW_OPER_MAGA_*.cdf").unwrap();
    assert_eq!(found, expected);

    let all = discover(&[dir.path().to_path_buf()], "*").unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn test_discover_deduplicates_and_keeps_explicit_files() {
    let dir = tempfile::tempdir().unwrap();
    products(dir.path());
    let readme = dir.path().join("README.txt");

    let found = discover(
        &[readme.clone(), readme.clone(), dir.path().to_path_buf()],
        "*.cdf",
    )
    .unwrap();
    assert_eq!(found.len(), 3);
    assert!(found.contains(&readme));
}

#[test]
fn test_discover_missing_path() {
    let err = discover(&[PathBuf::from("/nonexistent/products")], "*").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/products"));
}

#[test]
fn test_register_pipes_selection() {
    let (_root, deployment) = deployment();
    let dir = tempfile::tempdir().unwrap();
    let files = products(dir.path());

    let engine = FakeEngine::new();
    engine.state().capture_output = format!(
        "register\t-\t-\t{}\nskip\t-\t-\t{}\n",
        files[0].display(),
        files[1].display()
    );
    let mut out = Vec::new();
    let mut rest = Vec::new();
    let count = Registrar::new(&engine, &deployment)
        .register(
            "SW_OPER_MAGA_LR_1B",
            &[dir.path().to_path_buf()],
            None,
            false,
            &mut out,
            &mut rest,
        )
        .unwrap();

    assert_eq!(count, 1);
    assert!(out.is_empty());
    assert!(String::from_utf8(rest).unwrap().starts_with("skip"));

    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("exec-capture vires-swarm python3"));
    assert!(calls[0].ends_with("register --check -c SW_OPER_MAGA_LR_1B -f -"));
    assert!(calls[1].ends_with("product register -c SW_OPER_MAGA_LR_1B -f -"));

    let state = engine.state();
    // the status check sees both products, the registration only the new one
    assert_eq!(state.inputs[0].1.lines().count(), 2);
    assert_eq!(state.inputs[1].1, format!("{}\n", files[0].display()));
}

#[test]
fn test_register_dry_run_prints_selection() {
    let (_root, deployment) = deployment();
    let dir = tempfile::tempdir().unwrap();
    let files = products(dir.path());

    let engine = FakeEngine::new();
    engine.state().capture_output = format!("update\t-\t{}\t-\n", files[1].display());
    let mut out = Vec::new();
    let mut rest = Vec::new();
    let count = Registrar::new(&engine, &deployment)
        .register(
            "SW_OPER_MAGA_LR_1B",
            &[dir.path().to_path_buf()],
            None,
            true,
            &mut out,
            &mut rest,
        )
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        format!("{}\n", files[1].display())
    );
    assert!(!engine.calls().iter().any(|c| c.starts_with("exec-input")));
}

#[test]
fn test_register_nothing_new() {
    let (_root, deployment) = deployment();
    let dir = tempfile::tempdir().unwrap();
    products(dir.path());

    let engine = FakeEngine::new();
    let count = Registrar::new(&engine, &deployment)
        .register(
            "SW_OPER_MAGA_LR_1B",
            &[dir.path().to_path_buf()],
            None,
            false,
            &mut Vec::new(),
            &mut Vec::new(),
        )
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(engine.calls().len(), 1);
}

#[test]
fn test_register_no_matching_files() {
    let (_root, deployment) = deployment();
    let dir = tempfile::tempdir().unwrap();
    products(dir.path());

    let engine = FakeEngine::new();
    let count = Registrar::new(&engine, &deployment)
        .register(
            "SW_OPER_MAGA_LR_1B",
            &[dir.path().to_path_buf()],
            Some("*.zip"),
            false,
            &mut Vec::new(),
            &mut Vec::new(),
        )
        .unwrap();
    assert_eq!(count, 0);
    assert!(engine.calls().is_empty());
}

#[test]
fn test_pattern_lookup() {
    let (_root, deployment) = deployment();
    let engine = FakeEngine::new();
    let registrar = Registrar::new(&engine, &deployment);
    assert_eq!(registrar.pattern("SW_OPER_MAGA_LR_1B"), "SW_OPER_MAGA_LR_1B_*.cdf");
    assert_eq!(registrar.pattern("SW_OPER_MAGB_LR_1B"), "*");
}

#[test]
fn test_cached_product() {
    let (_root, deployment) = deployment();
    let engine = FakeEngine::new();
    Registrar::new(&engine, &deployment)
        .cached_product("GFZ_AUX_DST", Path::new("/data/Dst_MJD_1998.dat"))
        .unwrap();

    let calls = engine.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("exec vires-swarm python3"));
    assert!(calls[0].ends_with("cached_product update GFZ_AUX_DST /data/Dst_MJD_1998.dat"));
}

#[test]
fn test_substitute() {
    let template = vec!["-c".to_string(), "{collection}".to_string(), "x{type}y".to_string()];
    assert_eq!(
        substitute(&template, &[("collection", "A"), ("type", "B")]),
        vec!["-c", "A", "xBy"]
    );
}
