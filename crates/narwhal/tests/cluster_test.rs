use narwhal::{
    AttractionClusterer, Engine, EngineConfig, Plane, Position, ProximityClusterer,
};

fn engine_with_two_groups() -> Engine<u32> {
    let mut cfg = EngineConfig::default();
    cfg.grid.toroidal = true;
    cfg.max_movement_per_step = Some(0.5);
    cfg.clustering.neighbor_distance = 6.0;
    cfg.clustering.min_cluster_size = 2;
    let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
    engine
        .register_plane(Plane::new("huddle", |_: &u32, _: &u32, _: f64| 0.2))
        .expect("plane");
    for (k, x, y) in [
        (1, 10.0, 10.0),
        (2, 13.0, 10.0),
        (3, 11.0, 13.0),
        (4, 60.0, 60.0),
        (5, 63.0, 61.0),
    ] {
        engine.add_entity(k, Position::new(x, y, 0.0)).expect("add");
    }
    engine.set_clusterer(ProximityClusterer::new());
    engine
}

#[test]
fn cluster_colors_survive_ticks() {
    let mut engine = engine_with_two_groups();
    let report = engine.step().expect("step");
    assert_eq!(report.clusters, Some(2));
    let first: Vec<_> = engine.clusters().to_vec();
    assert_eq!(first[0].members, vec![1, 2, 3]);
    assert_eq!(first[1].members, vec![4, 5]);
    assert_ne!(first[0].color, first[1].color);

    for _ in 0..5 {
        engine.step().expect("step");
        let now = engine.clusters();
        assert_eq!(now.len(), 2);
        assert_eq!(now[0].color, first[0].color);
        assert_eq!(now[1].color, first[1].color);
    }
    assert_eq!(engine.cluster_colors().len(), 2);
}

#[test]
fn removed_anchor_hands_color_to_a_fresh_anchor() {
    let mut engine = engine_with_two_groups();
    engine.step().expect("step");
    let old = engine.clusters()[0].color;
    assert_eq!(engine.clusters()[0].anchor, 1);

    engine.remove_entity(&1);
    engine.step().expect("step");
    let group = &engine.clusters()[0];
    assert_eq!(group.members, vec![2, 3]);
    assert_eq!(group.anchor, 2);
    assert_ne!(group.color, old);
}

struct Everyone;

impl AttractionClusterer<u32> for Everyone {
    fn refine(&mut self, points: &[(u32, Position)], _: Vec<Vec<u32>>) -> Vec<Vec<u32>> {
        vec![points.iter().map(|(k, _)| *k).collect()]
    }
}

#[test]
fn attraction_clusterer_output_is_colored() {
    let mut engine = engine_with_two_groups();
    engine.set_attraction_clusterer(Everyone);
    let report = engine.step().expect("step");
    assert_eq!(report.clusters, Some(1));
    assert_eq!(engine.clusters()[0].members.len(), 5);
    assert_eq!(engine.snapshot().clusters, engine.clusters().to_vec());
}

#[test]
fn disabled_clustering_is_skipped() {
    let mut cfg = EngineConfig::default();
    cfg.clustering.enabled = false;
    let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
    engine.set_clusterer(ProximityClusterer::new());
    engine.add_entity(1, Position::new(1.0, 1.0, 0.0)).expect("add");
    engine.add_entity(2, Position::new(2.0, 1.0, 0.0)).expect("add");
    assert_eq!(engine.step().expect("step").clusters, None);
    assert!(engine.clusters().is_empty());
}
