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
fn defaults_match_the_documented_limits() {
    let settings = Settings::from_defaults().expect("valid settings");
    assert_eq!(settings.quota.timezone, chrono_tz::Asia::Seoul);
    assert_eq!(settings.quota.limits.anonymous.get(), 300);
    assert_eq!(settings.quota.limits.authenticated.get(), 100);
    assert_eq!(settings.uploads.max_files.get(), DEFAULT_UPLOAD_MAX_FILES);
    assert_eq!(settings.preview.export_max_pages.get(), DEFAULT_EXPORT_MAX_PAGES);
    assert!(settings.database.url.is_none());
    assert_eq!(settings.identity.user_header.as_str(), "x-authenticated-user");
}

#[test]
fn anonymous_limit_cannot_be_stricter_than_authenticated() {
    let mut raw = RawSettings::default();
    raw.quota.anonymous_limit = Some(10);
    raw.quota.authenticated_limit = Some(20);

    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "quota.anonymous_limit"),
        other => panic!("expected invalid anonymous limit, got {other:?}"),
    }
}

#[test]
fn unknown_timezone_is_rejected() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        quota_timezone: Some("Mars/Olympus_Mons".to_string()),
        ..Default::default()
    };
    raw.apply_serve_overrides(&overrides);

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "quota.timezone",
            ..
        })
    ));
}

#[test]
fn zero_limits_are_rejected() {
    let mut raw = RawSettings::default();
    raw.quota.authenticated_limit = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.preview.max_pages = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.preview.export_max_pages = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "preview.export_max_pages",
            ..
        })
    ));
}

#[test]
fn blank_database_url_means_no_database() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn identity_headers_must_differ() {
    let mut raw = RawSettings::default();
    raw.identity.client_header = Some("x-authenticated-user".to_string());
    assert!(Settings::from_raw(raw).is_err());
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
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["pagesmith"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "pagesmith",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--quota-authenticated-limit",
        "5",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.quota_authenticated_limit, Some(5));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from(["pagesmith", "migrate", "--database-url", "postgres://m"]);
    match args.command.expect("migrate command") {
        Command::Migrate(migrate) => {
            assert_eq!(migrate.database.database_url.as_deref(), Some("postgres://m"));
        }
        _ => panic!("wrong command parsed"),
    }
}
