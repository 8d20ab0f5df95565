use labeling_parser::template::{ChannelSpec, FileType, ParseTemplate, XSpec};
use labeling_parser::{parse_file, write_outputs};
use std::io::Write;

fn write_csv(dir: &std::path::Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("input.csv");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

fn numeric_template() -> ParseTemplate {
    ParseTemplate {
        file_type: FileType::Csv,
        sheet_name: None,
        head_row: 0,
        skip_row: 0,
        x: XSpec {
            locator: Some("^time$".to_string()),
            use_index: false,
            is_time: false,
            name: "time".to_string(),
            unit: Some("s".to_string()),
        },
        channels: vec![
            ChannelSpec {
                channel_name: "temperature".to_string(),
                locator: "^temp$".to_string(),
                mandatory: true,
                color: Some("#FF0000".to_string()),
                unit: Some("C".to_string()),
            },
            ChannelSpec {
                channel_name: "missing_optional".to_string(),
                locator: "^nope$".to_string(),
                mandatory: false,
                color: None,
                unit: None,
            },
        ],
    }
}

#[test]
fn parses_numeric_csv_and_skips_missing_optional_channel() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "time,temp\n0,10.0\n1,11.5\n2,12.0\n",
    );

    let template = numeric_template();
    let series = parse_file(&template, &path).unwrap();

    assert_eq!(series.len(), 3);
    assert_eq!(series.x().data, vec![0.0, 1.0, 2.0]);
    assert_eq!(series.channels().len(), 1);
    assert_eq!(series.channels()[0].name, "temperature");
    assert_eq!(series.channels()[0].data, vec![10.0, 11.5, 12.0]);
}

#[test]
fn missing_mandatory_channel_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "time,other\n0,1\n1,2\n");

    let template = numeric_template();
    let err = parse_file(&template, &path).unwrap_err();
    assert!(matches!(err, labeling_parser::ParseError::ChannelMissing(_)));
}

#[test]
fn non_numeric_x_without_is_time_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "time,temp\nabc,10\n");

    let template = numeric_template();
    let err = parse_file(&template, &path).unwrap_err();
    assert!(matches!(err, labeling_parser::ParseError::NonNumericX));
}

#[test]
fn writes_small_series_as_json_only_with_overview() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "time,temp\n0,10\n1,11\n2,12\n");

    let template = numeric_template();
    let series = parse_file(&template, &path).unwrap();

    let stem = dir.path().join("out");
    let outcome = write_outputs(&stem, &series, 100_000, 5_000).unwrap();

    assert!(!outcome.use_binary_format);
    assert!(outcome.binary_path.is_none());
    assert!(std::path::Path::new(&outcome.json_path.unwrap()).exists());
    assert!(std::path::Path::new(&outcome.overview_path).exists());
}

#[test]
fn writes_large_series_as_binary_with_meta() {
    let dir = tempfile::tempdir().unwrap();
    let mut contents = String::from("time,temp\n");
    for i in 0..10 {
        contents.push_str(&format!("{i},{}\n", i as f64 * 0.5));
    }
    let path = write_csv(dir.path(), &contents);

    let template = numeric_template();
    let series = parse_file(&template, &path).unwrap();

    let stem = dir.path().join("out");
    let outcome = write_outputs(&stem, &series, 5, 5_000).unwrap();

    assert!(outcome.use_binary_format);
    assert!(std::path::Path::new(&outcome.binary_path.unwrap()).exists());
    assert!(std::path::Path::new(&outcome.meta_path.unwrap()).exists());
}
