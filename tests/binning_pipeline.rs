//! End-to-end pipeline tests: GeoJSON input, binning, network export, and
//! cluster write-back through the public API only.

use geobin::prelude::*;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cluster_records(center_x: f64, center_y: f64, species: &str) -> Vec<Record> {
    [
        (0.2, 0.2),
        (0.4, 0.6),
        (1.3, 0.5),
        (0.6, 1.4),
        (1.5, 1.5),
    ]
    .iter()
    .map(|(dx, dy)| Record::point(species, center_x + dx, center_y + dy))
    .collect()
}

fn four_clusters() -> Vec<Record> {
    let mut records = Vec::new();
    records.extend(cluster_records(10.0, 10.0, "stork"));
    records.extend(cluster_records(-12.0, 10.0, "heron"));
    records.extend(cluster_records(10.0, -12.0, "wren"));
    records.extend(cluster_records(-12.0, -12.0, "stork"));
    records
}

#[test]
fn test_geojson_collection_to_cells() {
    init_logs();
    let collection: geojson::FeatureCollection = serde_json::from_str(
        r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-58.2, -12.6] },
                    "properties": { "name": "Wood stork" }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-58.3, -12.5] },
                    "properties": { "name": "Jabiru" }
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[0.0, 0.0], [1.0, 1.0]]
                    },
                    "properties": { "name": "Migration route" }
                }
            ]
        }"#,
    )
    .unwrap();

    let records: Vec<Record> = collection
        .features
        .iter()
        .map(|feature| Record::from_geojson(feature).unwrap())
        .collect();

    let mut binner = QuadtreeGeoBinner::new();
    let added = binner.add_features(records);
    assert_eq!(added, 2);

    let cells = binner.cells();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].count, 2);
    assert_eq!(cells[0].species_top_list.len(), 2);
}

#[test]
fn test_finer_resolution_yields_more_cells() {
    let mut coarse = QuadtreeGeoBinner::new();
    coarse
        .set_extent([-16.0, -16.0, 16.0, 16.0])
        .set_max_cell_size_log2(4)
        .set_min_cell_size_log2(0);
    coarse.add_features(four_clusters());

    let mut fine = QuadtreeGeoBinner::new();
    fine.set_extent([-16.0, -16.0, 16.0, 16.0])
        .set_max_cell_size_log2(0)
        .set_min_cell_size_log2(0);
    fine.add_features(four_clusters());

    let coarse_cells = coarse.cells().len();
    let fine_cells = fine.cells().len();
    assert_eq!(coarse_cells, 4);
    assert_eq!(fine_cells, 16);

    // Every record is accounted for at both resolutions.
    assert_eq!(coarse.cells().iter().map(|c| c.count).sum::<usize>(), 20);
    assert_eq!(fine.cells().iter().map(|c| c.count).sum::<usize>(), 20);
}

#[test]
fn test_resolution_change_rebins_in_place() {
    let mut binner = QuadtreeGeoBinner::new();
    binner
        .set_extent([-16.0, -16.0, 16.0, 16.0])
        .set_max_cell_size_log2(4)
        .set_min_cell_size_log2(0);
    binner.add_features(four_clusters());
    assert_eq!(binner.cells().len(), 4);

    binner.set_max_cell_size_log2(0);
    assert_eq!(binner.cells().len(), 16);

    binner.set_max_cell_size_log2(4);
    assert_eq!(binner.cells().len(), 4);
}

#[test]
fn test_network_export_and_cluster_write_back() {
    let mut binner = QuadtreeGeoBinner::new();
    binner
        .set_extent([-16.0, -16.0, 16.0, 16.0])
        .set_max_cell_size_log2(4)
        .set_min_cell_size_log2(0);
    binner.add_features(four_clusters());

    let edges = binner.bipartite_edges();
    // One species per cluster, one cluster per cell.
    assert_eq!(edges.len(), 4);
    assert!(edges.iter().all(|edge| edge.count == 5));
    let stork_edges = edges.iter().filter(|edge| edge.species == "stork").count();
    assert_eq!(stork_edges, 2);

    let ids: Vec<u32> = (0..binner.cells().len() as u32).collect();
    binner.assign_bioregions(&ids).unwrap();
    for (position, cell) in binner.cells().iter().enumerate() {
        assert_eq!(cell.bioregion_id, Some(position as u32));
    }
}

#[test]
fn test_config_json_matches_setters() {
    let config: Config = serde_json::from_str(
        r#"{
            "max_cell_size_log2": 2,
            "min_cell_size_log2": 0,
            "node_capacity": 2,
            "lower_threshold": 1,
            "patch_mode": "none"
        }"#,
    )
    .unwrap();
    let mut from_config = QuadtreeGeoBinner::with_config(config).unwrap();
    from_config.set_extent([-4.0, -4.0, 4.0, 4.0]);

    let mut from_setters = QuadtreeGeoBinner::new();
    from_setters
        .set_extent([-4.0, -4.0, 4.0, 4.0])
        .set_max_cell_size_log2(2)
        .set_min_cell_size_log2(0)
        .set_max_cell_capacity(2)
        .set_min_cell_capacity(1)
        .set_patch_mode(PatchMode::None);

    let records = [
        Record::point("a", 0.5, 0.5),
        Record::point("a", 0.6, 0.6),
        Record::point("b", 3.5, 3.5),
    ];
    from_config.add_features(records.clone());
    from_setters.add_features(records);

    assert_eq!(from_config.cells(), from_setters.cells());
}
