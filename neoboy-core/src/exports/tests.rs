use std::collections::HashSet;

use super::*;
use crate::config::BridgeConfig;
use crate::test_utils::{FixtureCore, Naming, instantiate_wat};

fn namespace(names: &[&str]) -> HashSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn candidates_follow_probe_order() {
    assert_eq!(
        candidates(CoreKind::Gba, Export::LoadRom),
        [
            "_load_rom".to_string(),
            "load_rom".to_string(),
            "_gba_load_rom".to_string(),
            "gba_load_rom".to_string(),
        ]
    );
}

#[test]
fn decorated_name_wins_over_bare() {
    let names = namespace(&["init", "_init", "gb_init"]);
    let symbol = resolve_symbol(CoreKind::Gb, Export::Init, |n| names.contains(n));
    assert_eq!(symbol.as_deref(), Some("_init"));
}

#[test]
fn unprefixed_wins_over_prefixed() {
    let names = namespace(&["gbc_step_frame", "step_frame"]);
    let symbol = resolve_symbol(CoreKind::Gbc, Export::StepFrame, |n| names.contains(n));
    assert_eq!(symbol.as_deref(), Some("step_frame"));
}

#[test]
fn decorated_prefixed_wins_over_bare_prefixed() {
    let names = namespace(&["gba_reset", "_gba_reset"]);
    let symbol = resolve_symbol(CoreKind::Gba, Export::Reset, |n| names.contains(n));
    assert_eq!(symbol.as_deref(), Some("_gba_reset"));
}

#[test]
fn other_core_prefix_does_not_match() {
    let names = namespace(&["gb_load_rom"]);
    assert_eq!(
        resolve_symbol(CoreKind::Gba, Export::LoadRom, |n| names.contains(n)),
        None
    );
}

#[test]
fn every_naming_convention_binds_the_full_table() {
    for naming in [
        Naming::Bare,
        Naming::Emscripten,
        Naming::Prefixed(CoreKind::Gbc),
        Naming::EmscriptenPrefixed(CoreKind::Gbc),
    ] {
        let handle = FixtureCore::new(naming).instantiate(CoreKind::Gbc);
        assert!(
            handle.exports().missing().is_empty(),
            "{naming:?} left {:?} unresolved",
            handle.exports().missing()
        );
    }
}

#[test]
fn bound_symbol_is_recorded() {
    let handle = FixtureCore::new(Naming::EmscriptenPrefixed(CoreKind::Gb)).instantiate(CoreKind::Gb);
    assert_eq!(handle.exports().symbol(Export::Malloc), Some("_gb_malloc"));
    assert_eq!(handle.exports().symbol(Export::Free), Some("_gb_free"));
}

#[test]
fn omitted_exports_are_absent_not_errors() {
    let handle = FixtureCore::new(Naming::Bare)
        .without(Export::GetAudioBuffer)
        .without(Export::GetAudioBufferSize)
        .instantiate(CoreKind::Gb);

    let exports = handle.exports();
    assert!(exports.get_audio_buffer.is_none());
    assert!(exports.get_audio_buffer_size.is_none());
    assert!(exports.step_frame.is_some());
    assert_eq!(
        exports.missing(),
        vec![Export::GetAudioBuffer, Export::GetAudioBufferSize]
    );
}

#[test]
fn signature_mismatch_is_treated_as_absent() {
    let wat = r#"
        (module
          (memory (export "memory") 1)
          (func (export "step_frame") (param i32))
          (func (export "get_framebuffer") (result i32) (i32.const 0)))
    "#;
    let handle = instantiate_wat(wat, CoreKind::Gb, &BridgeConfig::default());
    assert!(!handle.exports().is_present(Export::StepFrame));
    assert!(handle.exports().is_present(Export::GetFramebuffer));
}

#[test]
fn non_function_exports_are_ignored() {
    let wat = r#"
        (module
          (memory (export "memory") 1)
          (global (export "_init") i32 (i32.const 0))
          (func (export "init")))
    "#;
    let handle = instantiate_wat(wat, CoreKind::Gb, &BridgeConfig::default());
    assert_eq!(handle.exports().symbol(Export::Init), Some("init"));
}
