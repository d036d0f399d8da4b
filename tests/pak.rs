#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fs;

use patchkit::pak::{
    self, deflate, inflate, Alias, PakArchive, PakError, PakVersion, PatchRule, PatchSet,
    WriteOutcome,
};

fn abc(version: PakVersion) -> PakArchive {
    PakArchive::from_resources(
        version,
        1,
        &[(10, b"a".to_vec()), (20, b"b".to_vec()), (30, b"c".to_vec())],
        &[],
    )
    .unwrap()
}

fn mixed() -> PakArchive {
    PakArchive::from_resources(
        PakVersion::V5,
        1,
        &[
            (1, b"<html>hello</html>".to_vec()),
            (2, deflate(b"body { color: red; }").unwrap()),
            (3, vec![0x89, b'P', b'N', b'G', 0x00, 0x01]),
            (4, Vec::new()),
        ],
        &[Alias { id: 9, target_index: 1 }],
    )
    .unwrap()
}

#[test]
fn parse_write_round_trip_preserves_contents() {
    for archive in [abc(PakVersion::V4), abc(PakVersion::V5), mixed()] {
        let again = PakArchive::parse(archive.write().unwrap()).unwrap();
        assert_eq!(again.version(), archive.version());
        assert_eq!(again.encoding(), archive.encoding());
        assert_eq!(again.ids().collect::<Vec<_>>(), archive.ids().collect::<Vec<_>>());
        for id in archive.ids() {
            assert_eq!(again.get(id), archive.get(id));
        }
        assert_eq!(again.as_bytes(), archive.as_bytes());
    }
}

#[test]
fn set_resource_changes_only_that_resource() {
    let mut archive = mixed();
    let before = mixed();
    archive.set_resource(1, b"<p>a much longer document than before</p>".to_vec()).unwrap();

    assert_eq!(archive.get(1).unwrap(), b"<p>a much longer document than before</p>");
    for id in [2, 3, 4] {
        assert_eq!(archive.get(id), before.get(id));
    }
    assert_eq!(archive.get(9), archive.get(2));

    let reparsed = PakArchive::parse(archive.as_bytes().to_vec()).unwrap();
    assert_eq!(reparsed.get(1), archive.get(1));
}

#[test]
fn batch_write_matches_sequential_writes() {
    let base = mixed();
    let mut mods = HashMap::new();
    mods.insert(1, b"x".to_vec());
    mods.insert(3, vec![0u8; 300]);
    mods.insert(4, b"now filled".to_vec());

    let batched = base.write_with_modifications(&mods).unwrap();

    let mut sequential = mixed();
    for id in [4u16, 1, 3] {
        sequential.set_resource(id, mods[&id].clone()).unwrap();
    }
    assert_eq!(batched, sequential.write().unwrap());
}

#[test]
fn unknown_resource_is_rejected() {
    let mut archive = abc(PakVersion::V4);
    assert!(matches!(
        archive.set_resource(99, b"z".to_vec()),
        Err(PakError::UnknownResource(99))
    ));
    assert_eq!(archive.get(99), None);
    assert_eq!(archive.get(0), None);
}

#[test]
fn replacing_a_with_z_keeps_neighbours() {
    let mut archive = abc(PakVersion::V4);
    let len_before = archive.as_bytes().len();

    let set = PatchSet::compile(&[PatchRule::new("a", "z")]).unwrap();
    let outcome = set.apply(&mut archive).unwrap();

    assert_eq!(outcome.patched.len(), 1);
    assert_eq!(outcome.patched[0].id, 10);
    assert!(outcome.unmatched.is_empty());
    assert_eq!(archive.get(10).unwrap(), b"z");
    assert_eq!(archive.get(20).unwrap(), b"b");
    assert_eq!(archive.get(30).unwrap(), b"c");
    assert_eq!(archive.as_bytes().len(), len_before);

    let offsets: Vec<u32> = archive.resources().iter().map(|r| r.offset).collect();
    assert!(offsets.windows(2).all(|w| w[0] + 1 == w[1]));
}

#[test]
fn growing_replacement_shifts_later_offsets() {
    let mut archive = abc(PakVersion::V4);
    let before: Vec<u32> = archive.resources().iter().map(|r| r.offset).collect();

    let set = PatchSet::compile(&[PatchRule::new("b", "bbbb")]).unwrap();
    set.apply(&mut archive).unwrap();

    let after: Vec<u32> = archive.resources().iter().map(|r| r.offset).collect();
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1], before[1]);
    assert_eq!(after[2], before[2] + 3);
    assert_eq!(archive.get(20).unwrap(), b"bbbb");
}

#[test]
fn gzip_resources_are_patched_inside_the_framing() {
    let mut archive = mixed();
    let set = PatchSet::compile(&[PatchRule::new("red", "blue")]).unwrap();
    let outcome = set.apply(&mut archive).unwrap();

    assert_eq!(outcome.patched.len(), 1);
    assert!(outcome.patched[0].gzipped);
    let stored = archive.get(2).unwrap();
    assert_eq!(inflate(2, stored).unwrap(), b"body { color: blue; }");
}

#[test]
fn binary_resources_are_never_patched() {
    let mut archive = mixed();
    let set = PatchSet::compile(&[PatchRule::new("PNG", "JPG")]).unwrap();
    let outcome = set.apply(&mut archive).unwrap();
    assert!(outcome.is_empty());
    assert_eq!(outcome.unmatched, vec![0]);
}

#[test]
fn export_import_reproduces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let archive = mixed();
    let manifest = pak::export(&archive, dir.path()).unwrap();

    let gz = &manifest.resources[&2];
    assert!(gz.gzipped && gz.decompressed);
    assert_eq!(
        fs::read_to_string(dir.path().join(&gz.file)).unwrap(),
        "body { color: red; }"
    );
    assert!(manifest.resources[&3].file.ends_with(".bin"));
    assert_eq!(manifest.aliases.get(&9), Some(&1));

    let back = pak::import(dir.path()).unwrap();
    assert_eq!(back.version(), archive.version());
    for id in archive.ids() {
        let (a, b) = (archive.get(id).unwrap(), back.get(id).unwrap());
        if id == 2 {
            assert_eq!(inflate(2, a).unwrap(), inflate(2, b).unwrap());
        } else {
            assert_eq!(a, b);
        }
    }
    assert_eq!(back.get(9), back.get(2));
}

#[test]
fn unsorted_resource_ids_are_rejected() {
    let mut bytes = abc(PakVersion::V5).into_bytes();
    // v5 table starts at 12; swap the ids of the first two entries
    bytes[12..14].copy_from_slice(&20u16.to_le_bytes());
    bytes[18..20].copy_from_slice(&10u16.to_le_bytes());
    assert!(matches!(PakArchive::parse(bytes), Err(PakError::Format(_))));

    let built = PakArchive::from_resources(
        PakVersion::V5,
        1,
        &[(20, b"twenty".to_vec()), (10, b"ten".to_vec())],
        &[Alias { id: 99, target_index: 0 }],
    );
    assert!(matches!(built, Err(PakError::Format(_))));
}

#[test]
fn aliases_keep_their_targets_through_export_and_import() {
    let dir = tempfile::tempdir().unwrap();
    let archive = PakArchive::from_resources(
        PakVersion::V5,
        1,
        &[(10, b"ten".to_vec()), (20, b"twenty".to_vec())],
        &[Alias { id: 98, target_index: 0 }, Alias { id: 99, target_index: 1 }],
    )
    .unwrap();

    pak::export(&archive, dir.path()).unwrap();
    let back = pak::import(dir.path()).unwrap();
    assert_eq!(back.get(98), Some(&b"ten"[..]));
    assert_eq!(back.get(99), Some(&b"twenty"[..]));
}

#[test]
fn broken_gzip_is_exported_raw_and_imported_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let broken = vec![0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef];
    let archive = PakArchive::from_resources(
        PakVersion::V5,
        1,
        &[(1, broken.clone()), (2, b"fine".to_vec())],
        &[],
    )
    .unwrap();

    let manifest = pak::export(&archive, dir.path()).unwrap();
    let entry = &manifest.resources[&1];
    assert!(entry.gzipped);
    assert!(!entry.decompressed);
    assert_eq!(entry.original_size, broken.len());
    assert_eq!(fs::read(dir.path().join(&entry.file)).unwrap(), broken);

    let back = pak::import(dir.path()).unwrap();
    assert_eq!(back.get(1), Some(&broken[..]));
    assert_eq!(back.get(2), Some(&b"fine"[..]));
}

#[test]
fn edited_export_is_picked_up_on_import() {
    let dir = tempfile::tempdir().unwrap();
    let pak_path = dir.path().join("resources.pak");
    let out_dir = dir.path().join("export");
    fs::write(&pak_path, abc(PakVersion::V5).as_bytes()).unwrap();

    let manifest = pak::export_file(&pak_path, &out_dir).unwrap();
    fs::write(out_dir.join(&manifest.resources[&20].file), "edited").unwrap();

    let outcome = pak::import_file(&out_dir, &pak_path).unwrap();
    assert!(matches!(outcome, WriteOutcome::Written { .. }));
    assert_eq!(pak::open(&pak_path).unwrap().get(20).unwrap(), b"edited");
    assert!(pak::backup_path(&pak_path).exists());
}

#[test]
fn truncated_and_unknown_versions_fail() {
    let bytes = abc(PakVersion::V4).into_bytes();
    assert!(matches!(
        PakArchive::parse(bytes[..12].to_vec()),
        Err(PakError::Truncated { .. })
    ));

    let mut v3 = bytes.clone();
    v3[0] = 3;
    assert!(matches!(PakArchive::parse(v3), Err(PakError::Format(_))));
}

#[test]
fn find_paks_walks_directories() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("locales")).unwrap();
    fs::write(dir.path().join("resources.pak"), abc(PakVersion::V4).as_bytes()).unwrap();
    fs::write(dir.path().join("locales/en-US.pak"), abc(PakVersion::V5).as_bytes()).unwrap();
    fs::write(dir.path().join("notes.txt"), "x").unwrap();

    let found = pak::find_paks(dir.path()).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|p| p.extension().is_some_and(|e| e == "pak")));
}
