use narwhal::{
    Engine, EngineConfig, Error, Plane, Position, TagAffinity, WeightTable, XorShift64Star,
};

fn constant(v: f64) -> impl Fn(&u32, &u32, f64) -> f64 + Send + Sync {
    move |_: &u32, _: &u32, _: f64| v
}

fn toroidal_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.grid.toroidal = true;
    cfg.distances.minimal = 2.0;
    cfg.distances.maximal_perception = Some(20.0);
    cfg.max_movement_per_step = Some(5.0);
    cfg
}

#[test]
fn pair_across_the_corner_closes_in_through_the_wrap() {
    let cfg = toroidal_config();
    let minimal = cfg.distances.minimal;
    let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
    engine
        .register_plane(
            Plane::new("kin", move |_: &u32, _: &u32, d: f64| {
                if d > minimal { 1.0 } else { 0.0 }
            })
            .with_weight(1.0),
        )
        .expect("plane");
    engine.add_entity(1, Position::new(5.0, 5.0, 0.0)).expect("add");
    engine.add_entity(2, Position::new(95.0, 95.0, 0.0)).expect("add");

    let g = engine.geometry().clone();
    let before_1 = engine.position(&1).expect("1");
    let before_2 = engine.position(&2).expect("2");
    let before = g.distance(&before_1, &before_2).length;
    assert!((before - 14.142_135_623_730_95).abs() < 1e-9);

    let report = engine.step().expect("step");
    assert_eq!(report.moved, 2);

    let after_1 = engine.position(&1).expect("1");
    let after_2 = engine.position(&2).expect("2");
    assert!(g.distance(&after_1, &after_2).length < before);
    assert!(g.distance(&before_1, &after_1).length <= 5.0 + 1e-9);
    assert!(g.distance(&before_2, &after_2).length <= 5.0 + 1e-9);
    // Entity 1 stepped down-left across the corner, not toward the grid center.
    assert!(after_1.x < 5.0 && after_1.y < 5.0, "after_1={after_1:?}");
    assert_eq!(engine.candidate_count(&1), Some(1));
}

#[test]
fn coincident_entities_push_apart() {
    let mut cfg = toroidal_config();
    cfg.out_group_repulsion = 1.0;
    let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
    engine
        .register_plane(Plane::new("rivals", constant(-1.0)))
        .expect("plane");
    engine.add_entity(1, Position::new(50.0, 50.0, 0.0)).expect("add");
    engine.add_entity(2, Position::new(50.0, 50.0, 0.0)).expect("add");

    let report = engine.step().expect("step");
    assert_eq!(report.moved, 2);
    let force = engine.last_force(&1).expect("force");
    assert!(force.x < 0.0 && force.y == 0.0, "force={force:?}");

    engine.run(9).expect("run");
    let g = engine.geometry().clone();
    let p1 = engine.position(&1).expect("1");
    let p2 = engine.position(&2).expect("2");
    let d = g.distance(&p1, &p2).length;
    assert!(d > engine.config().distances.minimal, "distance={d}");
}

#[test]
fn displacement_never_exceeds_the_cap() {
    let mut cfg = toroidal_config();
    cfg.max_movement_per_step = Some(1.5);
    cfg.out_group_repulsion = 1.0;
    let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
    let tags = (0..60u32).fold(TagAffinity::new(2.0, -1.0), |t, i| {
        t.with_tag(i, if i % 3 == 0 { "a" } else { "b" })
    });
    engine.register_plane(Plane::new("tags", tags)).expect("tags");
    engine
        .register_plane(Plane::new("drift", constant(0.25)).with_weight(3.0))
        .expect("drift");
    engine.scatter(0..60, 99).expect("scatter");

    let g = engine.geometry().clone();
    for _ in 0..10 {
        let before = engine.snapshot();
        engine.step().expect("step");
        for (entity, old) in &before.positions {
            let new = engine.position(entity).expect("tracked");
            let moved = g.distance(old, &new).length;
            assert!(moved <= 1.5 + 1e-9, "entity {entity} moved {moved}");
        }
    }
}

#[test]
fn amplified_attraction_is_still_clamped() {
    let mut cfg = toroidal_config();
    cfg.amplification.enabled = true;
    cfg.amplification.power = 2.0;
    let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
    engine
        .register_plane(Plane::new("kin", constant(1.0)))
        .expect("plane");
    engine.add_entity(1, Position::new(40.0, 50.0, 0.0)).expect("add");
    engine.add_entity(2, Position::new(50.0, 50.0, 0.0)).expect("add");

    engine.step().expect("step");
    // distance 10 -> amplified force 100, clamped to 5.
    let force = engine.last_force(&1).expect("force");
    assert!((force.x - 100.0).abs() < 1e-9, "force={force:?}");
    let p1 = engine.position(&1).expect("1");
    assert!((p1.x - 45.0).abs() < 1e-9, "p1={p1:?}");
}

#[test]
fn non_finite_force_rolls_the_tick_back() {
    let mut engine: Engine<u32> = Engine::new(toroidal_config()).expect("engine");
    engine
        .register_plane(Plane::new(
            "flaky",
            |a: &u32, _: &u32, _: f64| if *a == 2 { f64::NAN } else { 1.0 },
        ))
        .expect("plane");
    engine.add_entity(1, Position::new(10.0, 10.0, 0.0)).expect("add");
    engine.add_entity(2, Position::new(14.0, 10.0, 0.0)).expect("add");
    let before = engine.snapshot();
    let sector_before = engine.sector_index().and_then(|s| s.sector_of(&1));

    let err = engine.step();
    assert!(matches!(err, Err(Error::NonFinitePosition { ref entity, .. }) if entity == "2"));
    assert_eq!(engine.snapshot(), before);
    assert_eq!(engine.tick(), 0);
    assert!(engine.last_force(&1).is_none());
    assert_eq!(engine.sector_index().and_then(|s| s.sector_of(&1)), sector_before);
}

#[test]
fn sector_queries_match_a_full_scan() {
    let mut sectored = toroidal_config();
    sectored.max_movement_per_step = Some(2.0);
    let mut scanned = sectored.clone();
    scanned.grid.use_sectors = false;

    let build = |cfg: EngineConfig| {
        let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
        let tags = (0..80u32).fold(TagAffinity::new(1.0, -0.5), |t, i| {
            t.with_tag(i, if i % 2 == 0 { "even" } else { "odd" })
        });
        engine.register_plane(Plane::new("tags", tags)).expect("tags");
        engine.scatter(0..80, 2024).expect("scatter");
        engine
    };
    let mut a = build(sectored);
    let mut b = build(scanned);
    assert!(a.sector_index().is_some());
    assert!(b.sector_index().is_none());

    for _ in 0..5 {
        a.step().expect("a");
        b.step().expect("b");
    }
    for ((ka, pa), (kb, pb)) in a.positions().zip(b.positions()) {
        assert_eq!(ka, kb);
        assert!((pa - pb).norm() < 1e-6, "{ka}: {pa:?} vs {pb:?}");
    }
    let a_total: usize = (0..80).filter_map(|k| a.candidate_count(&k)).sum();
    let b_total: usize = (0..80).filter_map(|k| b.candidate_count(&k)).sum();
    assert!(a_total < b_total, "sectored={a_total} scanned={b_total}");
}

#[test]
fn perception_independence_widens_candidates() {
    let build = |independent: bool| {
        let mut cfg = toroidal_config();
        cfg.perception_independence = independent;
        let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
        engine
            .register_plane(
                Plane::new("global", constant(0.01)).with_perception_constraint(false),
            )
            .expect("plane");
        engine.add_entity(1, Position::new(10.0, 10.0, 0.0)).expect("add");
        engine.add_entity(2, Position::new(60.0, 60.0, 0.0)).expect("add");
        engine.step().expect("step");
        engine
    };
    assert_eq!(build(false).candidate_count(&1), Some(0));
    assert_eq!(build(true).candidate_count(&1), Some(1));
}

#[test]
fn individual_weights_scale_plane_forces() {
    let mut cfg = toroidal_config();
    cfg.max_movement_per_step = None;
    let mut engine: Engine<u32> = Engine::new(cfg).expect("engine");
    engine
        .register_plane(Plane::new("kin", constant(1.0)).with_weight(0.5))
        .expect("plane");
    let mut weights = WeightTable::new();
    weights.set_plane_weight(1u32, "kin", 4.0);
    engine.set_weight_provider(weights);
    engine.add_entity(1, Position::new(30.0, 30.0, 0.0)).expect("add");
    engine.add_entity(2, Position::new(40.0, 30.0, 0.0)).expect("add");
    engine.step().expect("step");

    assert!((engine.last_force(&1).expect("1").x - 2.0).abs() < 1e-9);
    // Entity 2 has no override and sees entity 1 at distance 8.
    assert!((engine.last_force(&2).expect("2").x + 0.5).abs() < 1e-9);
}

#[test]
fn run_reports_every_tick() {
    let mut engine: Engine<u32> = Engine::new(toroidal_config()).expect("engine");
    engine
        .register_plane(Plane::new("kin", constant(0.5)))
        .expect("plane");
    let mut rng = XorShift64Star::new(3);
    for i in 0..10 {
        let p = engine.geometry().random_point(&mut rng);
        engine.add_entity(i, p).expect("add");
    }
    let reports = engine.run(4).expect("run");
    assert_eq!(reports.iter().map(|r| r.tick).collect::<Vec<_>>(), [1, 2, 3, 4]);
    assert!(reports.iter().all(|r| r.entities == 10 && r.clusters.is_none()));
    assert_eq!(engine.tick(), 4);
}
