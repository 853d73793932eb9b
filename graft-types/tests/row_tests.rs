use graft_types::{CellValue, Row};

#[test]
fn get_returns_cell_by_column() {
    let row = Row::from_pairs(0, [("Person", CellValue::from("Alice"))]);
    assert_eq!(row.get("Person"), Some(&CellValue::Text("Alice".to_string())));
    assert_eq!(row.get("Org"), None);
}

#[test]
fn blank_row_detection() {
    let blank = Row::from_pairs(0, [("A", CellValue::Empty), ("B", CellValue::Empty)]);
    assert!(blank.is_blank());

    let row = Row::from_pairs(0, [("A", CellValue::Empty), ("B", CellValue::from(1.0))]);
    assert!(!row.is_blank());
}

#[test]
fn cell_values_serialize_untagged() {
    assert_eq!(
        serde_json::to_string(&CellValue::from("x")).unwrap(),
        "\"x\""
    );
    assert_eq!(serde_json::to_string(&CellValue::from(2.5)).unwrap(), "2.5");
    assert_eq!(
        serde_json::to_string(&CellValue::from(true)).unwrap(),
        "true"
    );
    assert_eq!(serde_json::to_string(&CellValue::Empty).unwrap(), "null");
}
