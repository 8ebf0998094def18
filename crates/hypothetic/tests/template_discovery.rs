//! Template discovery against local objects.

use std::path::Path;
use std::sync::Arc;

use hypothetic::{
    build_metadata_table_at, find_template, HypotheticError, HypotheticResult, KeyRecord,
    MetadataDeclaration, MetadataTable,
};
use storage::{RemoteAccess, StorageOptions};
use test_utils::{fixed_time, schedules, write_cube_file, CountingFetcher, JsonCubeReader, GRID_DIMS};

fn table_over(dir: &Path, periods: usize) -> MetadataTable {
    let declaration = MetadataDeclaration::new()
        .with_axis("forecast_period", (0..periods as i64).collect::<Vec<_>>())
        .unwrap();
    let dir = dir.to_path_buf();
    let generator = move |r: &KeyRecord| -> HypotheticResult<String> {
        Ok(dir
            .join(format!("fp{}.json", r["forecast_period"]))
            .to_string_lossy()
            .into_owned())
    };
    build_metadata_table_at(
        &declaration,
        &schedules::SIX_HOURLY_ONE_RUN,
        &generator,
        fixed_time(2024, 1, 15, 14),
    )
    .unwrap()
}

#[tokio::test]
async fn test_first_readable_row_wins_and_later_rows_untouched() {
    let data = tempfile::tempdir().unwrap();
    let table = table_over(data.path(), 6);
    // Rows 0..3 missing, rows 3 and 4 present
    write_cube_file(data.path(), "fp3.json", "soil_temperature", &GRID_DIMS, 3.0);
    write_cube_file(data.path(), "fp4.json", "soil_temperature", &GRID_DIMS, 4.0);

    let fetcher = CountingFetcher::remote();
    let template = find_template(
        &table,
        Some("soil_temperature"),
        &fetcher,
        &JsonCubeReader,
        &StorageOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(template.row_index(), 3);
    assert_eq!(template.uri(), table.uri(3).unwrap());
    assert!(template.cube().data.iter().all(|&v| v == 3.0));
    assert_eq!(fetcher.requests(), table.uris()[..4].to_vec());
}

#[tokio::test]
async fn test_unreadable_objects_are_skipped() {
    let data = tempfile::tempdir().unwrap();
    let table = table_over(data.path(), 3);
    std::fs::write(data.path().join("fp0.json"), b"not json").unwrap();
    write_cube_file(data.path(), "fp1.json", "x_wind", &GRID_DIMS, 1.0);
    write_cube_file(data.path(), "fp2.json", "soil_temperature", &GRID_DIMS, 2.0);

    let template = find_template(
        &table,
        Some("soil_temperature"),
        &RemoteAccess::new().unwrap(),
        &JsonCubeReader,
        &StorageOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(template.row_index(), 2);

    // Without a variable filter the wrong-variable file is acceptable
    let template = find_template(
        &table,
        None,
        &RemoteAccess::new().unwrap(),
        &JsonCubeReader,
        &StorageOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(template.row_index(), 1);
    assert_eq!(template.cube().variable, "x_wind");
}

#[tokio::test]
async fn test_no_readable_row_is_template_not_found() {
    let data = tempfile::tempdir().unwrap();
    let table = table_over(data.path(), 4);

    let fetcher = CountingFetcher::remote();
    let err = find_template(&table, None, &fetcher, &JsonCubeReader, &StorageOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HypotheticError::TemplateNotFound(_)), "{:?}", err);
    assert_eq!(fetcher.count(), 4);
}

#[tokio::test]
async fn test_malformed_uri_aborts_scan() {
    let declaration = MetadataDeclaration::new().with_axis("n", [0, 1]).unwrap();
    let generator = |r: &KeyRecord| -> HypotheticResult<String> {
        Ok(format!("s3://bucket-without-key-{}", r["n"]))
    };
    let table = build_metadata_table_at(
        &declaration,
        &schedules::SIX_HOURLY_ONE_RUN,
        &generator,
        fixed_time(2024, 1, 15, 14),
    )
    .unwrap();

    let fetcher = CountingFetcher::remote();
    let err = find_template(&table, None, &fetcher, &JsonCubeReader, &StorageOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HypotheticError::Configuration(_)), "{:?}", err);
    assert_eq!(fetcher.count(), 1);
}

#[tokio::test]
async fn test_temporary_copies_are_released() {
    let data = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let table = table_over(data.path(), 4);
    std::fs::write(data.path().join("fp0.json"), b"corrupt").unwrap();
    std::fs::write(data.path().join("fp1.json"), b"corrupt").unwrap();
    write_cube_file(data.path(), "fp2.json", "soil_temperature", &GRID_DIMS, 2.0);

    let fetcher = Arc::new(RemoteAccess::new().unwrap().with_temp_dir(scratch.path()));
    let template = find_template(
        &table,
        None,
        fetcher.as_ref(),
        &JsonCubeReader,
        &StorageOptions::default(),
    )
    .await
    .unwrap();

    // Only the template's own copy survives the scan
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 1);
    assert!(template.local().path().starts_with(scratch.path()));

    drop(template);
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}
