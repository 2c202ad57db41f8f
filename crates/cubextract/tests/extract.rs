use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use cubextract::app::session::{Outcome, Session, SessionRequest};
use cubextract::domain::errors::ExtractError;
use cubextract::infra::config::Config;
use cubextract::infra::prompt::LinePrompter;
use insta::assert_snapshot;

fn write(root: &Path, path: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().expect("parent")).expect("create dirs");
    fs::write(full, path.as_bytes()).expect("write file");
}

fn blink_sdk(root: &Path) {
    for path in [
        "examples/Blink/BoardX_U123/EWARM/a.ewp",
        "examples/Blink/BoardX_U123/EWARM/b.ewd",
        "examples/Blink/BoardX_U123/Core/Src/main.c",
        "examples/Blink/BoardX_U123/Drivers/bsp.c",
        "examples/Blink/BoardY_noserial/EWARM/a.ewp",
        "CMSIS/Include/core_cm33.h",
        "dfp/startup_u123.s",
        "dfp/stm32u123.h",
    ] {
        write(root, path);
    }
}

fn listing(root: &Path) -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).expect("read dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).expect("relative");
                files.insert(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    files
}

fn extract(root: &Path, board: &str, destination: PathBuf) -> anyhow::Result<Outcome> {
    let config = Config::builtin()?;
    let mut prompter = LinePrompter::new(Cursor::new(""), Vec::new());
    let mut session = Session::new(&config, &mut prompter)?;
    session.run(SessionRequest {
        root: Some(root.to_path_buf()),
        example: Some("Blink".into()),
        board: Some(board.into()),
        ide: Some("IAR".into()),
        destination: Some(destination),
        ..SessionRequest::default()
    })
}

#[test]
fn iar_bundle_holds_project_startup_and_header() {
    let temp = tempfile::tempdir().unwrap();
    blink_sdk(temp.path());

    let outcome = extract(temp.path(), "BoardX", temp.path().join("out")).unwrap();
    assert_eq!(outcome.bundle, temp.path().join("out/Blink_IAR"));
    assert_eq!(outcome.locations.model.as_str(), "123");
    assert_eq!(outcome.selection.sub_example, None);

    let files: Vec<String> = listing(&outcome.bundle).into_iter().collect();
    assert_snapshot!(files.join("\n"), @r"
    CMSIS/Include/core_cm33.h
    EWARM/a.ewp
    EWARM/b.ewd
    inc/stm32u123.h
    startup_u123.s
    ");
}

#[test]
fn rerunning_into_existing_bundle_gives_same_result() {
    let temp = tempfile::tempdir().unwrap();
    blink_sdk(temp.path());
    let out = temp.path().join("out");

    let first = extract(temp.path(), "BoardX", out.clone()).unwrap();
    let before = listing(&first.bundle);
    let second = extract(temp.path(), "BoardX", out.clone()).unwrap();
    assert_eq!(second.bundle, first.bundle);
    assert_eq!(listing(&second.bundle), before);

    let entries: Vec<_> = fs::read_dir(&out).unwrap().collect();
    assert_eq!(entries.len(), 1, "no stage or backup directories left behind");
}

#[test]
fn board_without_model_number_fails_before_writing() {
    let temp = tempfile::tempdir().unwrap();
    blink_sdk(temp.path());
    let out = temp.path().join("out");

    let err = extract(temp.path(), "BoardY_noserial", out.clone()).unwrap_err();
    let err = err.downcast::<ExtractError>().unwrap();
    assert!(matches!(err, ExtractError::ModelNotExtractable { .. }));
    assert_eq!(err.exit_code(), 5);
    assert!(!out.exists());
}

#[test]
fn missing_startup_file_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    blink_sdk(temp.path());
    fs::remove_file(temp.path().join("dfp/startup_u123.s")).unwrap();

    let err = extract(temp.path(), "BoardX", temp.path().join("out")).unwrap_err();
    let err = err.downcast::<ExtractError>().unwrap();
    assert!(matches!(err, ExtractError::StartupFileNotFound { ref model, .. } if model == "123"));
}
