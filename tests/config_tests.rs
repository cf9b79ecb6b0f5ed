use scroll_sequence::config::Configuration;
use std::time::Duration;

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.frame_count, 40);
    assert_eq!(cfg.path, "frames/frame-");
    assert_eq!(cfg.extension, ".jpg");
    assert_eq!(cfg.digits, 3);
    assert_eq!(cfg.frame_stride, 1);
    assert!((cfg.zoom - 1.1).abs() < f32::EPSILON);
    assert!(cfg.chroma_key);
    assert_eq!(cfg.chroma_threshold, 40);
    assert_eq!(cfg.chroma_fade_width, 20);
    assert_eq!(cfg.paint_interval, Duration::from_millis(16));
    assert_eq!(cfg.resize_settle, Duration::from_millis(100));
    assert!((cfg.surface.width - 300.0).abs() < f32::EPSILON);
    assert!((cfg.surface.height - 500.0).abs() < f32::EPSILON);
    assert!(cfg.validated().is_ok());
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
frame-count: 80
path: "assets/seq/shot_"
extension: ".png"
digits: 4
frame-stride: 2
zoom: 1.25
chroma-key: false
chroma-threshold: 12
chroma-fade-width: 0
loader-max-concurrent-decodes: 2
paint-interval: 33ms
resize-settle: 1s
surface:
  width: 320
  height: 240
  device-pixel-ratio: 2.0
presentation:
  contrast: 1.05
  brightness: 1.1
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.frame_count, 80);
    assert_eq!(cfg.digits, 4);
    assert!(!cfg.chroma_key);
    assert_eq!(cfg.chroma_fade_width, 0);
    assert_eq!(cfg.loader_max_concurrent_decodes, 2);
    assert_eq!(cfg.paint_interval, Duration::from_millis(33));
    assert_eq!(cfg.resize_settle, Duration::from_secs(1));
    assert!((cfg.surface.device_pixel_ratio - 2.0).abs() < f32::EPSILON);
    assert!((cfg.presentation.brightness - 1.1).abs() < f32::EPSILON);

    let catalog = cfg.catalog();
    assert_eq!(catalog.uri_for(0), "assets/seq/shot_0001.png");
    assert_eq!(catalog.uri_for(3), "assets/seq/shot_0007.png");
    assert!(cfg.compositor().chroma.is_none());
}

#[test]
fn unknown_keys_are_rejected() {
    let err = serde_yaml::from_str::<Configuration>("frame-count: 3\nframe-rate: 30\n");
    assert!(err.is_err());

    let err = serde_yaml::from_str::<Configuration>("surface:\n  depth: 3\n");
    assert!(err.is_err());
}

#[test]
fn validation_rejects_out_of_range_values() {
    let cases = [
        "frame-count: 0",
        "digits: 0",
        "frame-stride: 0",
        "zoom: 0",
        "zoom: -1.0",
        "zoom: 9.0",
        "loader-max-concurrent-decodes: 0",
        "paint-interval: 0s",
        "surface: { device-pixel-ratio: 0 }",
        "surface: { width: -5 }",
        "presentation: { contrast: -1 }",
    ];
    for yaml in cases {
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validated().is_err(), "accepted {yaml:?}");
    }
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "frame-count: 12\npath: \"file:///srv/frames/f\"\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.frame_count, 12);
    assert_eq!(cfg.catalog().uri_for(11), "file:///srv/frames/f012.jpg");

    assert!(Configuration::from_yaml_file(dir.path().join("missing.yaml")).is_err());
}
