// tests/integration_classifier.rs
use scanward_core::invocation::{classify, Action};

fn argv(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| (*t).to_string()).collect()
}

#[test]
fn compile_invocation_is_analyzable() {
    let result = classify(&argv(&["cc", "-c", "main.c", "-o", "main.o"])).unwrap();
    assert_eq!(result.action, Action::Compile);
    assert!(result.action.is_analyzable());
    assert_eq!(result.files, vec![std::path::PathBuf::from("main.c")]);
}

#[test]
fn link_only_invocation_is_not_analyzable() {
    let result = classify(&argv(&["cc", "main.o", "util.o", "-o", "app"])).unwrap();
    assert_eq!(result.action, Action::Link);
    assert!(result.action.is_analyzable());
    assert!(result.files.is_empty());
}

#[test]
fn internal_invocations_win_over_everything() {
    let result = classify(&argv(&["cc", "-cc1", "-c", "main.c"])).unwrap();
    assert_eq!(result.action, Action::Internal);
    assert!(!result.action.is_analyzable());
}

#[test]
fn arch_list_preserves_order_and_duplicates() {
    let result = classify(&argv(&[
        "cc", "-c", "-arch", "i386", "-arch", "ppc", "-arch", "i386", "main.c",
    ]))
    .unwrap();
    assert_eq!(result.arch_list, vec!["i386", "ppc", "i386"]);
}

#[test]
fn sectorder_consumes_exactly_four_tokens() {
    let result = classify(&argv(&[
        "cc", "-c", "-sectorder", "a", "b", "c", "-DX=1", "main.c",
    ]))
    .unwrap();
    assert!(!result.flags.iter().any(|f| f.contains("sectorder")));
    assert!(!result.flags.contains(&"a".to_string()));
    assert!(!result.flags.contains(&"b".to_string()));
    assert!(!result.flags.contains(&"c".to_string()));
    assert!(result.flags.contains(&"-DX=1".to_string()));
}

#[test]
fn truncated_flag_with_argument_is_an_error() {
    assert!(classify(&argv(&["cc", "-c", "main.c", "-o"])).is_err());
}

#[test]
fn classification_round_trips_on_understood_flags() {
    let original = classify(&argv(&[
        "cc", "-c", "-x", "c", "-DX=1", "-Iinclude", "-arch", "x86_64", "main.c",
    ]))
    .unwrap();

    // rebuild an argv from the classification and classify again
    let mut rebuilt = vec!["cc".to_string(), "-c".to_string()];
    for arch in &original.arch_list {
        rebuilt.push("-arch".to_string());
        rebuilt.push(arch.clone());
    }
    rebuilt.extend(original.flags.iter().cloned());
    if let Some(language) = &original.language {
        rebuilt.push("-x".to_string());
        rebuilt.push(language.clone());
    }
    for file in &original.files {
        rebuilt.push(file.display().to_string());
    }

    let again = classify(&rebuilt).unwrap();
    assert_eq!(again.language, original.language);
    assert_eq!(again.arch_list, original.arch_list);
    assert_eq!(again.flags, original.flags);
    assert_eq!(again.files, original.files);
}

#[test]
fn silencing_warnings_survive_other_warnings_do_not() {
    let result = classify(&argv(&[
        "cc", "-c", "-Wall", "-Wno-unused", "-Wcast-align", "main.c",
    ]))
    .unwrap();
    assert!(result.flags.contains(&"-Wno-unused".to_string()));
    assert!(!result.flags.contains(&"-Wall".to_string()));
    assert!(!result.flags.contains(&"-Wcast-align".to_string()));
}
