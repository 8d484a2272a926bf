use std::fs;

use mslearn_engine::{ensure_output_dir, AtomicFileWriter, PersistError};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("datasets").join("dns");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("ms_learn_training_data.jsonl", b"{}\n").unwrap();
    assert_eq!(first.file_name().unwrap(), "ms_learn_training_data.jsonl");
    assert_eq!(fs::read_to_string(&first).unwrap(), "{}\n");

    let second = writer
        .write("ms_learn_training_data.jsonl", b"{\"a\":1}\n")
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "{\"a\":1}\n");

    let leftovers: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn json_files_are_pretty_and_newline_terminated() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let path = writer
        .write_json("meta.json", &json!({"dataset": "MS_Learn"}))
        .unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert_eq!(text, "{\n  \"dataset\": \"MS_Learn\"\n}\n");
}

#[test]
fn file_in_place_of_directory_is_an_output_dir_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("meta.json", b"data");
    assert!(matches!(result, Err(PersistError::OutputDir(_))));
    assert!(!file_path.with_file_name("meta.json").exists());
}
