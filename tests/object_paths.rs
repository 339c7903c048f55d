use std::io::Write;

use anyhow::Result;
use stemma::encoding::SnapshotReader;
use stemma::object::{OBJECT_ENCODING_VERSION, snapshot_load, snapshot_save};
use stemma::{Error, OBJECT_KEY_MAX, ObjectType, TypedObject};

#[test]
fn nested_set_then_type_switch_destroys_the_subtree() -> Result<()> {
    let mut obj = TypedObject::new();

    obj.set_str("a.b.c", "x")?;
    assert_eq!(obj.get_type("a"), ObjectType::Object);
    assert_eq!(obj.get_str("a.b.c")?, "x");

    obj.set_long("a.b", 7)?;
    assert_eq!(obj.exists("a.b.c").unwrap_err(), Error::NotFound);
    assert_eq!(obj.get_long("a.b")?, 7);
    Ok(())
}

#[test]
fn lookups_through_scalar_intermediates_miss() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_str("a.b", "hello")?;

    assert_eq!(obj.get("a.b.c").unwrap_err(), Error::NotFound);
    assert_eq!(obj.exists("a.b.c").unwrap_err(), Error::NotFound);
    assert_eq!(obj.get_type("a.b.c"), ObjectType::Null);
    Ok(())
}

#[test]
fn wrong_type_reads_are_rejected() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_long("n", 1)?;
    obj.set_double("d", 0.5)?;

    assert_eq!(obj.get_str("n").unwrap_err(), Error::WrongType);
    assert_eq!(obj.get_long("d").unwrap_err(), Error::WrongType);
    assert_eq!(obj.get_double("n").unwrap_err(), Error::WrongType);
    Ok(())
}

#[test]
fn del_and_exists() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_str("x.y", "v")?;

    obj.exists("x.y")?;
    obj.del("x.y")?;
    assert_eq!(obj.exists("x.y").unwrap_err(), Error::NotFound);
    assert_eq!(obj.del("x.y").unwrap_err(), Error::NotFound);

    // The intermediate object survives.
    assert_eq!(obj.get_type("x"), ObjectType::Object);
    Ok(())
}

#[test]
fn set_semantics() -> Result<()> {
    let mut obj = TypedObject::new();

    obj.add_set("tags", "red")?;
    obj.add_set("tags", "blue")?;
    assert_eq!(obj.add_set("tags", "red").unwrap_err(), Error::Exists);
    assert_eq!(obj.len(Some("tags"))?, 2);

    obj.rem_set("tags", "red")?;
    assert_eq!(obj.rem_set("tags", "red").unwrap_err(), Error::NotFound);
    assert_eq!(obj.get_set("tags").map(|set| set.len()), Some(1));

    // Adding to a scalar is a type error; removing from one is invalid.
    obj.set_str("name", "n")?;
    assert_eq!(obj.add_set("name", "x").unwrap_err(), Error::WrongType);
    assert_eq!(obj.rem_set("name", "x").unwrap_err(), Error::Invalid);
    Ok(())
}

#[test]
fn array_semantics() -> Result<()> {
    let mut obj = TypedObject::new();

    obj.add_array("list", ObjectType::String, "one")?;
    obj.add_array("list", ObjectType::String, "two")?;
    assert_eq!(obj.len(Some("list"))?, 2);
    assert_eq!(obj.get_type("list"), ObjectType::Array);

    assert_eq!(
        obj.add_array("list", ObjectType::Long, "3").unwrap_err(),
        Error::WrongType
    );

    // A scalar key is replaced by a fresh array.
    obj.set_long("list2", 9)?;
    obj.add_array("list2", ObjectType::String, "x")?;
    assert_eq!(obj.len(Some("list2"))?, 1);
    Ok(())
}

#[test]
fn len_per_value_kind() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_str("s", "hello")?;
    obj.set_long("i", 42)?;
    obj.set_double("f", 1.5)?;
    obj.set_str("o.inner", "x")?;
    obj.add_set("set", "a")?;

    assert_eq!(obj.len(None)?, 5);
    assert_eq!(obj.len(Some("s"))?, 5);
    assert_eq!(obj.len(Some("i"))?, 1);
    assert_eq!(obj.len(Some("f"))?, 1);
    assert_eq!(obj.len(Some("o"))?, 1);
    assert_eq!(obj.len(Some("set"))?, 1);
    assert_eq!(obj.len(Some("missing")).unwrap_err(), Error::NotFound);
    Ok(())
}

#[test]
fn path_length_cap() -> Result<()> {
    let mut obj = TypedObject::new();

    let at_cap = "k".repeat(OBJECT_KEY_MAX);
    obj.set_long(&at_cap, 1)?;
    assert_eq!(obj.get_long(&at_cap)?, 1);

    let over_cap = "k".repeat(OBJECT_KEY_MAX + 1);
    assert_eq!(obj.set_long(&over_cap, 1).unwrap_err(), Error::NameTooLong);
    assert_eq!(obj.get(&over_cap).unwrap_err(), Error::NameTooLong);
    Ok(())
}

#[test]
fn snapshot_round_trip() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_str("name", "widget")?;
    obj.set_long("count", -12)?;
    obj.set_double("ratio", 0.25)?;
    obj.set_str("nested.deep.key", "v")?;
    obj.add_set("tags", "a")?;
    obj.add_set("tags", "b")?;

    let mut bytes = Vec::new();
    snapshot_save(&obj, &mut bytes);

    let mut reader = SnapshotReader::new(&bytes);
    let loaded = snapshot_load(&mut reader, OBJECT_ENCODING_VERSION)?;
    assert_eq!(loaded, obj);
    assert!(reader.is_empty());
    Ok(())
}

#[test]
fn snapshot_drops_array_keys() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_str("kept", "yes")?;
    obj.add_array("dropped", ObjectType::String, "x")?;

    let mut bytes = Vec::new();
    snapshot_save(&obj, &mut bytes);

    let loaded = snapshot_load(&mut SnapshotReader::new(&bytes), OBJECT_ENCODING_VERSION)?;
    assert_eq!(loaded.get_str("kept")?, "yes");
    assert_eq!(loaded.exists("dropped").unwrap_err(), Error::NotFound);
    Ok(())
}

#[test]
fn snapshot_version_mismatch_is_refused() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_long("k", 1)?;

    let mut bytes = Vec::new();
    snapshot_save(&obj, &mut bytes);

    let err = snapshot_load(&mut SnapshotReader::new(&bytes), OBJECT_ENCODING_VERSION + 1)
        .unwrap_err();
    assert_eq!(err, Error::VersionMismatch);
    Ok(())
}

#[test]
fn snapshot_survives_the_filesystem() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_str("a.b", "through disk")?;

    let mut bytes = Vec::new();
    snapshot_save(&obj, &mut bytes);

    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&bytes)?;
    let read_back = std::fs::read(file.path())?;

    let loaded = snapshot_load(&mut SnapshotReader::new(&read_back), OBJECT_ENCODING_VERSION)?;
    assert_eq!(loaded, obj);
    Ok(())
}

#[test]
fn truncated_snapshot_is_detected() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_str("key", "value")?;

    let mut bytes = Vec::new();
    snapshot_save(&obj, &mut bytes);
    bytes.truncate(bytes.len() - 2);

    let err = snapshot_load(&mut SnapshotReader::new(&bytes), OBJECT_ENCODING_VERSION)
        .unwrap_err();
    assert!(matches!(err, Error::Corrupt(_)));
    Ok(())
}
