use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:8080");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.database.max_connections.get(), 8);
    assert!(settings.database.url.is_none());
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
    assert_eq!(settings.cache.namespace, "userline");
    assert_eq!(settings.cache.ttl, Duration::from_secs(86_400));
    assert_eq!(settings.cache.negative_ttl, Duration::from_secs(60));
    assert_eq!(settings.cache.memory_capacity, 10_000);
    assert_eq!(settings.aggregation.deadline, Duration::from_millis(3_000));
    assert_eq!(settings.aggregation.max_concurrency, 16);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn redis_backend_requires_url() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());

    let err = Settings::from_raw(raw.clone()).expect_err("missing redis url");
    assert!(matches!(err, LoadError::Invalid { key: "cache.redis_url", .. }));

    raw.cache.redis_url = Some("redis://127.0.0.1:6379".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.cache.backend,
        CacheBackend::Redis {
            url: "redis://127.0.0.1:6379".to_string()
        }
    );
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());
    let err = Settings::from_raw(raw).expect_err("unknown backend");
    assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));
}

#[test]
fn zero_values_are_rejected() {
    let cases: [(fn(&mut RawSettings), &str); 5] = [
        (|raw| raw.server.port = Some(0), "server.port"),
        (|raw| raw.cache.ttl_seconds = Some(0), "cache.ttl_seconds"),
        (
            |raw| raw.cache.negative_ttl_seconds = Some(0),
            "cache.negative_ttl_seconds",
        ),
        (
            |raw| raw.aggregation.deadline_ms = Some(0),
            "aggregation.deadline_ms",
        ),
        (
            |raw| raw.aggregation.max_concurrency = Some(0),
            "aggregation.max_concurrency",
        ),
    ];

    for (mutate, expected_key) in cases {
        let mut raw = RawSettings::default();
        mutate(&mut raw);
        match Settings::from_raw(raw) {
            Err(LoadError::Invalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected invalid `{expected_key}`, got {other:?}"),
        }
    }
}

#[test]
fn cache_settings_feed_cache_config() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(120);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let config = crate::cache::CacheConfig::from(&settings.cache);
    assert_eq!(config.ttl, Duration::from_secs(120));
    assert_eq!(config.negative_ttl, Duration::from_secs(60));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["userline"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "userline",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--cache-backend",
        "redis",
        "--aggregation-deadline-ms",
        "500",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.cache_backend.as_deref(), Some("redis"));
            assert_eq!(serve.overrides.aggregation_deadline_ms, Some(500));
        }
    }
}
