// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use fxcam::Config;
use fxcam::backends::camera::{Orientation, SourceKind};
use fxcam::filters::FilterKind;
use fxcam::pipeline::ContentFit;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert!(config.mirror_preview, "Mirror preview should be enabled by default");
    assert_eq!(config.filter, FilterKind::Comic);
    assert_eq!(config.content_fit, ContentFit::Fill);
    assert_eq!(config.source, SourceKind::TestPattern);
    assert!(config.drawable_count >= 2);
}

#[test]
fn test_config_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = Config {
        source: SourceKind::PipeWire {
            node: Some("57".into()),
        },
        filter: FilterKind::Mono,
        orientation: Orientation::Portrait,
        content_fit: ContentFit::Contain,
        density: 2.0,
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = Config::load_or_default(&dir.path().join("absent.json"));
    assert_eq!(loaded, Config::default());
}
