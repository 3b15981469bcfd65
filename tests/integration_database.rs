// tests/integration_database.rs
use std::fs;
use std::path::PathBuf;

use scanward_core::compilation::{CompilationDatabase, CompilerKind};

fn write_db(dir: &std::path::Path, content: &str) -> PathBuf {
    let path = dir.join("compile_commands.json");
    fs::write(&path, content).unwrap();
    path
}

fn touch(dir: &std::path::Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "int x;\n").unwrap();
    path
}

#[test]
fn loads_command_string_entries() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "main.c");
    let db = write_db(
        dir.path(),
        &format!(
            r#"[{{"directory": "{0}", "file": "main.c", "command": "cc -c -DX=1 main.c"}}]"#,
            dir.path().display()
        ),
    );

    let compilations = CompilationDatabase::load(&db).unwrap();
    assert_eq!(compilations.len(), 1);
    let c = &compilations[0];
    assert_eq!(c.compiler, CompilerKind::C);
    assert!(c.source.ends_with("main.c"));
    assert!(c.source.is_absolute());
    assert!(c.flags.contains(&"-DX=1".to_string()));
}

#[test]
fn loads_arguments_list_entries() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "thing.cpp");
    let db = write_db(
        dir.path(),
        &format!(
            r#"[{{"directory": "{0}", "file": "thing.cpp",
                 "arguments": ["c++", "-c", "-std=c++17", "thing.cpp"]}}]"#,
            dir.path().display()
        ),
    );

    let compilations = CompilationDatabase::load(&db).unwrap();
    assert_eq!(compilations.len(), 1);
    assert_eq!(compilations[0].compiler, CompilerKind::Cxx);
    assert!(compilations[0].flags.contains(&"-std=c++17".to_string()));
}

#[test]
fn quoted_command_strings_are_tokenized() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "main.c");
    let db = write_db(
        dir.path(),
        &format!(
            r#"[{{"directory": "{0}", "file": "main.c",
                 "command": "cc -c \"-DMSG=\\\"hi there\\\"\" main.c"}}]"#,
            dir.path().display()
        ),
    );

    let compilations = CompilationDatabase::load(&db).unwrap();
    assert_eq!(compilations.len(), 1);
    assert!(compilations[0]
        .flags
        .iter()
        .any(|f| f.contains("hi there")));
}

#[test]
fn link_entries_are_filtered_out() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "main.c");
    let db = write_db(
        dir.path(),
        &format!(
            r#"[{{"directory": "{0}", "file": "main.c", "command": "cc main.o -o app"}}]"#,
            dir.path().display()
        ),
    );
    assert!(CompilationDatabase::load(&db).unwrap().is_empty());
}

#[test]
fn unparsable_database_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let db = write_db(dir.path(), "this is not json");
    assert!(CompilationDatabase::load(&db).is_err());
}

#[test]
fn missing_database_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(CompilationDatabase::load(&dir.path().join("nope.json")).is_err());
}

#[test]
fn save_and_reload_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.c");
    touch(dir.path(), "b.c");
    let db = write_db(
        dir.path(),
        &format!(
            r#"[{{"directory": "{0}", "file": "a.c", "command": "cc -c -O2 a.c"}},
                {{"directory": "{0}", "file": "b.c", "command": "cc -c b.c"}}]"#,
            dir.path().display()
        ),
    );

    let loaded = CompilationDatabase::load(&db).unwrap();
    let copy = dir.path().join("copy.json");
    CompilationDatabase::save(&copy, &loaded).unwrap();
    let reloaded = CompilationDatabase::load(&copy).unwrap();

    assert_eq!(loaded.len(), reloaded.len());
    for (a, b) in loaded.iter().zip(reloaded.iter()) {
        assert_eq!(a.source, b.source);
        assert_eq!(a.flags, b.flags);
        assert_eq!(a.compiler, b.compiler);
    }
}
