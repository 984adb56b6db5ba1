//! Property tests for entry navigation and edits.

use flatrec_core::{Config, CoreError, FileKind, Registry};
use flatrec_testkit::prelude::*;
use proptest::prelude::*;

const F: FileKind = FileKind::StoredStrings;

fn seeded(file: &FlatFile) -> TestStore {
    let mut fixture = TestStore::memory();
    fixture.seed(F, &file.to_bytes());
    fixture
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn goto_then_scan_round_trips(file in flat_file_strategy(12)) {
        let mut fixture = seeded(&file);
        for ordinal in 0..=file.count() {
            prop_assert!(fixture.store.goto_entry(F, ordinal).unwrap());
            let start = fixture.store.tell(F).unwrap();
            let len = fixture.store.skip_past_next_delimiter(F).unwrap();
            prop_assert!(len >= 2);
            let text = fixture.store.read_bytes(F, start, len as usize - 2).unwrap();
            prop_assert_eq!(text.as_slice(), file.line(ordinal).unwrap().as_bytes());
        }
    }

    #[test]
    fn get_entry_matches_model(file in flat_file_strategy(12)) {
        let mut fixture = seeded(&file);
        for ordinal in 0..=file.count() {
            let entry = fixture.store.get_entry(F, ordinal).unwrap().unwrap();
            prop_assert_eq!(entry.text.as_str(), file.line(ordinal).unwrap());
        }
        prop_assert!(fixture.store.get_entry(F, file.count() + 1).unwrap().is_none());
    }

    #[test]
    fn count_is_delimiters_minus_one(file in flat_file_strategy(16)) {
        let mut fixture = seeded(&file);
        let delimiters = fixture.store.count_delimiters(F).unwrap();
        prop_assert_eq!(delimiters, file.count() + 1);
        prop_assert_eq!(fixture.store.count_entries(F).unwrap(), delimiters - 1);
    }

    #[test]
    fn file_without_delimiter_has_no_entries(text in entry_text_strategy()) {
        let mut fixture = TestStore::memory();
        fixture.seed(F, text.as_bytes());
        prop_assert_eq!(fixture.store.count_entries(F).unwrap(), 0);
    }

    #[test]
    fn delete_decrements_count((file, ordinal) in file_and_ordinal_strategy(12)) {
        let mut fixture = seeded(&file);
        let before = fixture.store.count_entries(F).unwrap();
        fixture.store.delete(F, ordinal).unwrap();
        prop_assert_eq!(fixture.store.count_entries(F).unwrap(), before - 1);

        let mut model = file.clone();
        model.delete(ordinal);
        prop_assert_eq!(fixture.contents(F), model.to_bytes());
    }

    #[test]
    fn insert_shifts_following_entry(
        (file, ordinal) in file_and_ordinal_strategy(12),
        text in entry_text_strategy(),
    ) {
        let mut fixture = seeded(&file);
        let previous = file.line(ordinal).unwrap().to_string();
        fixture.store.insert(F, ordinal, &text).unwrap();

        let inserted = fixture.store.get_entry(F, ordinal).unwrap().unwrap();
        prop_assert_eq!(inserted.text, text.clone());
        let shifted = fixture.store.get_entry(F, ordinal + 1).unwrap().unwrap();
        prop_assert_eq!(shifted.text, previous);

        let mut model = file.clone();
        model.insert(ordinal, &text);
        prop_assert_eq!(fixture.contents(F), model.to_bytes());
    }

    #[test]
    fn replace_matches_model(
        (file, ordinal) in file_and_ordinal_strategy(12),
        text in entry_text_strategy(),
    ) {
        let mut fixture = seeded(&file);
        fixture.store.replace(F, ordinal, &text).unwrap();
        let mut model = file.clone();
        model.replace(ordinal, &text);
        prop_assert_eq!(fixture.contents(F), model.to_bytes());
    }

    #[test]
    fn sequential_read_equals_cold_read((file, ordinal) in file_and_ordinal_strategy(12)) {
        let mut warm = seeded(&file);
        let mut cold = seeded(&file);

        let k = ordinal - 1;
        warm.store.get_entry(F, k).unwrap();
        let sequential = warm.store.get_entry(F, k + 1).unwrap();
        let fresh = cold.store.get_entry(F, k + 1).unwrap();

        prop_assert_eq!(&sequential, &fresh);
        prop_assert_eq!(warm.store.stats().sequential_reads, 1);
        prop_assert_eq!(cold.store.stats().sequential_reads, 0);
    }

    #[test]
    fn sequential_walk_equals_cold_reads(file in flat_file_strategy(12)) {
        let mut warm = seeded(&file);
        let mut cold = seeded(&file);
        for ordinal in 0..=file.count() + 1 {
            let sequential = warm.store.get_entry(F, ordinal).unwrap();
            let fresh = cold.store.get_entry(F, ordinal).unwrap();
            prop_assert_eq!(sequential, fresh);
            // Forget the cold store's position so every read stays cold.
            cold.store.get_entry(FileKind::TempFile, 0).unwrap();
        }
    }

    #[test]
    fn capacity_boundary_leaves_file_unmodified(
        header in header_strategy(),
        entries in fixed_width_entries_strategy(12, 8..12),
    ) {
        let file = FlatFile::new(header, entries);
        let mut fixture = TestStore::memory_with(
            Config::new().scratch_capacity(64),
            Registry::default(),
        );
        fixture.seed(F, &file.to_bytes());
        let original = fixture.contents(F);

        let longer = format!("{}+", file.line(1).unwrap());
        let replaced = fixture.store.replace(F, 1, &longer);
        prop_assert!(
            matches!(replaced, Err(CoreError::CapacityExceeded { .. })),
            "replace returned {:?}",
            replaced
        );
        let inserted = fixture.store.insert(F, 1, "x");
        prop_assert!(
            matches!(inserted, Err(CoreError::CapacityExceeded { .. })),
            "insert returned {:?}",
            inserted
        );
        prop_assert_eq!(fixture.contents(F), original);
    }

    #[test]
    fn fixed_width_navigation_matches_scan(
        header in header_strategy(),
        entries in fixed_width_entries_strategy(6, 1..20),
    ) {
        let file = FlatFile::new(header, entries);
        let mut fixture = TestStore::memory();
        fixture.seed(FileKind::UserTable, &file.to_bytes());

        prop_assert_eq!(fixture.store.count_entries(FileKind::UserTable).unwrap(), file.count());
        for ordinal in 1..=file.count() {
            let entry = fixture.store.get_entry(FileKind::UserTable, ordinal).unwrap().unwrap();
            prop_assert_eq!(entry.text.as_str(), file.line(ordinal).unwrap());

            prop_assert!(fixture.store.goto_entry(FileKind::UserTable, ordinal).unwrap());
            prop_assert_eq!(fixture.store.tell(FileKind::UserTable).unwrap(), file.offset_of(ordinal));
            prop_assert_eq!(
                fixture.store.current_entry_ordinal(FileKind::UserTable).unwrap(),
                ordinal
            );
        }
        prop_assert_eq!(fixture.store.stats().width_violations, 0);
        prop_assert!(fixture.store.stats().fixed_width_hits > 0);
    }

    #[test]
    fn broken_fixed_width_falls_back(
        header in header_strategy(),
        entries in fixed_width_entries_strategy(6, 3..12),
        extra in "[A-Z]{1,7}",
    ) {
        // Widening by less than one entry width leaves stray bytes the
        // arithmetic can see.
        let mut file = FlatFile::new(header, entries);
        let widened = format!("{}{}", file.line(2).unwrap(), extra);
        file.replace(2, &widened);

        let mut fixture = TestStore::memory();
        fixture.seed(FileKind::UserTable, &file.to_bytes());
        prop_assert_eq!(fixture.store.count_entries(FileKind::UserTable).unwrap(), file.count());
        prop_assert_eq!(fixture.store.stats().width_violations, 1);

        for ordinal in 0..=file.count() {
            prop_assert!(fixture.store.goto_entry(FileKind::UserTable, ordinal).unwrap());
            prop_assert_eq!(fixture.store.tell(FileKind::UserTable).unwrap(), file.offset_of(ordinal));
            let entry = fixture.store.get_entry(FileKind::UserTable, ordinal).unwrap().unwrap();
            prop_assert_eq!(entry.text.as_str(), file.line(ordinal).unwrap());
        }
        prop_assert!(fixture.store.stats().width_violations > 1);
    }
}
