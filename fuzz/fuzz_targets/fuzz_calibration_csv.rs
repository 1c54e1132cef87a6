#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(table) = joint_config::parse_calibration_csv(data) {
        assert_eq!(table.len(), joint_config::TABLE_ENTRIES);
        assert!(joint_core::table_is_valid(&table));
    }
});
