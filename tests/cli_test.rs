//! CLI integration tests for the schema-mapping binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("schema-mapping"));
    cmd.env_remove("SCHEMA_MAPPING_URL")
        .env_remove("SCHEMA_MAPPING_CONNECTION")
        .env_remove("RUST_LOG");
    cmd
}

// Helper to create a temp input file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const PERSON: &str = r##"{
    "id": "api-person",
    "slug": "person",
    "label_one": "Contact Person",
    "label_many": "Contact People",
    "selector": {
        "label": "Person",
        "pointer": "#",
        "type_label": "Object",
        "children": [
            {
                "label": "Full name",
                "pointer": "#/name",
                "type_label": "Text",
                "input_types": [{ "input_type": { "type": "string" }, "transformations": ["direct"] }]
            },
            {
                "label": "Created",
                "pointer": "#/created_at",
                "type_label": "Date",
                "input_types": [{
                    "input_type": { "type": "string", "format": "date-time" },
                    "transformations": ["date"]
                }]
            }
        ]
    }
}"##;

const OBJECTS: &str = r#"[
    {
        "id": "dev-contact",
        "slug": "contact",
        "label": "Contact",
        "fields": [
            { "slug": "name", "simple_type": { "type": "string" } },
            { "slug": "created", "simple_type": { "type": "string", "format": "date-time" } }
        ],
        "events": [{ "slug": "contact.deleted", "type": "delete" }]
    }
]"#;

fn api_objects() -> String {
    format!(
        r#"[{}, {{ "id": "api-invoice", "slug": "invoice", "label_one": "Invoice" }}]"#,
        PERSON
    )
}

const COMPLETE_MAPPING: &str = r##"{
    "objects": [],
    "mapping": [{
        "crm_object_id": "dev-contact",
        "api_object_id": "api-person",
        "transformations": [
            { "field": { "slug": "name" }, "name": "direct", "source_pointer": "#/name" },
            { "field": { "slug": "created" }, "name": "date", "source_pointer": "#/created_at" }
        ],
        "event_actions": [
            { "event": { "slug": "contact.deleted" }, "action_type": "delete" }
        ]
    }]
}"##;

mod options_command {
    use super::*;

    #[test]
    fn prints_tree() {
        let dir = TempDir::new().unwrap();
        let file = write_temp_file(&dir, "person.json", PERSON);

        cmd()
            .args(["options", file.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Person (#): Object"))
            .stdout(predicate::str::contains("  Full name (#/name): Text"));
    }

    #[test]
    fn marks_selectable_and_locked_date() {
        let dir = TempDir::new().unwrap();
        let file = write_temp_file(&dir, "person.json", PERSON);

        cmd()
            .args([
                "options",
                file.to_str().unwrap(),
                "--type",
                "string",
                "--format",
                "date-time",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created (#/created_at): Date"))
            .stdout(predicate::str::contains("date on (locked)"));
    }

    #[test]
    fn json_output_with_search() {
        let dir = TempDir::new().unwrap();
        let file = write_temp_file(&dir, "person.json", PERSON);

        let output = cmd()
            .args([
                "options",
                file.to_str().unwrap(),
                "--search",
                "name",
                "--type",
                "string",
                "--json",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());

        let views: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(views[0]["value"], "#");
        assert_eq!(views[0]["selectable"], false);
        let children = views[0]["children"].as_array().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["value"], "#/name");
        assert_eq!(children[0]["selectable"], true);
        assert_eq!(children[0]["date"]["disabled"], true);
    }

    #[test]
    fn accepts_bare_selector() {
        let dir = TempDir::new().unwrap();
        let file = write_temp_file(
            &dir,
            "selector.json",
            r##"{ "label": "Root", "pointer": "#" }"##,
        );

        cmd()
            .args(["options", file.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Root (#)"));
    }

    #[test]
    fn format_requires_type() {
        cmd()
            .args(["options", "person.json", "--format", "date-time"])
            .assert()
            .failure();
    }

    #[test]
    fn missing_file_exit_code_3() {
        cmd()
            .args(["options", "/nonexistent/person.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }

    #[test]
    fn invalid_json_exit_code_2() {
        let dir = TempDir::new().unwrap();
        let file = write_temp_file(&dir, "bad.json", "{ not json");

        cmd()
            .args(["options", file.to_str().unwrap()])
            .assert()
            .code(2);
    }
}

mod suggest_command {
    use super::*;

    #[test]
    fn ranks_matching_first() {
        let dir = TempDir::new().unwrap();
        let objects = write_temp_file(&dir, "objects.json", OBJECTS);
        let api = write_temp_file(&dir, "api.json", &api_objects());

        cmd()
            .args([
                "suggest",
                "--objects",
                objects.to_str().unwrap(),
                "--api-objects",
                api.to_str().unwrap(),
                "--object",
                "contact",
            ])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("* Contact Person (person)"))
            .stdout(predicate::str::contains("  Invoice (invoice)"));
    }

    #[test]
    fn json_output() {
        let dir = TempDir::new().unwrap();
        let objects = write_temp_file(&dir, "objects.json", OBJECTS);
        let api = write_temp_file(&dir, "api.json", &api_objects());

        let output = cmd()
            .args([
                "suggest",
                "--objects",
                objects.to_str().unwrap(),
                "--api-objects",
                api.to_str().unwrap(),
                "--object",
                "dev-contact",
                "--json",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());

        let candidates: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(candidates[0]["id"], "api-person");
        assert_eq!(candidates[0]["suggested"], true);
        assert_eq!(candidates[1]["suggested"], false);
    }

    #[test]
    fn unknown_object() {
        let dir = TempDir::new().unwrap();
        let objects = write_temp_file(&dir, "objects.json", OBJECTS);
        let api = write_temp_file(&dir, "api.json", &api_objects());

        cmd()
            .args([
                "suggest",
                "--objects",
                objects.to_str().unwrap(),
                "--api-objects",
                api.to_str().unwrap(),
                "--object",
                "deal",
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("unknown developer object 'deal'"));
    }
}

mod check_command {
    use super::*;

    #[test]
    fn complete_mapping_passes() {
        let dir = TempDir::new().unwrap();
        let objects = write_temp_file(&dir, "objects.json", OBJECTS);
        let api = write_temp_file(&dir, "api.json", &api_objects());
        let mapping = write_temp_file(&dir, "mapping.json", COMPLETE_MAPPING);

        cmd()
            .args([
                "check",
                "--objects",
                objects.to_str().unwrap(),
                "--api-objects",
                api.to_str().unwrap(),
                "--mapping",
                mapping.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("contact -> api-person"))
            .stdout(predicate::str::contains("1 objects checked, all complete"));
    }

    #[test]
    fn missing_mapping_file_is_unpaired() {
        let dir = TempDir::new().unwrap();
        let objects = write_temp_file(&dir, "objects.json", OBJECTS);
        let api = write_temp_file(&dir, "api.json", &api_objects());

        cmd()
            .args([
                "check",
                "--objects",
                objects.to_str().unwrap(),
                "--api-objects",
                api.to_str().unwrap(),
                "--mapping",
                dir.path().join("none.json").to_str().unwrap(),
            ])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("warning[W002]"))
            .stdout(predicate::str::contains("1 unpaired"));
    }

    #[test]
    fn json_reports_diagnostics() {
        let dir = TempDir::new().unwrap();
        let objects = write_temp_file(&dir, "objects.json", OBJECTS);
        let api = write_temp_file(&dir, "api.json", &api_objects());
        let mapping = write_temp_file(
            &dir,
            "mapping.json",
            r##"{
                "mapping": [{
                    "crm_object_id": "dev-contact",
                    "api_object_id": "api-person",
                    "transformations": [
                        { "field": { "slug": "name" }, "name": "direct", "source_pointer": "#/renamed" }
                    ]
                }]
            }"##,
        );

        let output = cmd()
            .args([
                "check",
                "--objects",
                objects.to_str().unwrap(),
                "--api-objects",
                api.to_str().unwrap(),
                "--mapping",
                mapping.to_str().unwrap(),
                "--json",
            ])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));

        let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(result["incomplete"], 1);
        let codes: Vec<&str> = result["results"][0]["diagnostics"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, ["E001", "E004", "E002"]);
    }

    #[test]
    fn output_writes_pruned_mapping() {
        let dir = TempDir::new().unwrap();
        let objects = write_temp_file(&dir, "objects.json", OBJECTS);
        let api = write_temp_file(&dir, "api.json", &api_objects());
        let mapping = write_temp_file(
            &dir,
            "mapping.json",
            r#"{
                "mapping": [
                    { "crm_object_id": "dev-contact", "api_object_id": "api-person" },
                    { "crm_object_id": "dev-contact", "api_object_id": "api-removed" }
                ]
            }"#,
        );
        let out = dir.path().join("merged.json");

        cmd()
            .args([
                "check",
                "--objects",
                objects.to_str().unwrap(),
                "--api-objects",
                api.to_str().unwrap(),
                "--mapping",
                mapping.to_str().unwrap(),
                "--output",
                out.to_str().unwrap(),
            ])
            .assert()
            .code(1);

        let merged: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        let pairs = merged["mapping"].as_array().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0]["api_object_id"], "api-person");
        assert_eq!(merged["objects"][0]["slug"], "contact");
    }

    #[test]
    fn requires_a_source() {
        cmd()
            .arg("check")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("--objects or --base-url"));
    }

    #[test]
    fn missing_objects_file_exit_code_3() {
        let dir = TempDir::new().unwrap();
        let api = write_temp_file(&dir, "api.json", &api_objects());

        cmd()
            .args([
                "check",
                "--objects",
                "/nonexistent/objects.json",
                "--api-objects",
                api.to_str().unwrap(),
            ])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("failed to load mapping"));
    }
}
