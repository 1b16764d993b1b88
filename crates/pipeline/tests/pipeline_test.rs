use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::Arc;
use ticket_etl_core::{
    AnalysisWindow, InputConfig, MarketConfig, OutputConfig, OutputFormat, PipelineConfig,
    PipelineError, Rule, SectionConfig, Source, WeatherThresholds,
};
use ticket_etl_data::{
    RawSectionCapacity, RawTicketSale, RawWeatherObservation, WarehouseWriter,
};
use ticket_etl_pipeline::{Pipeline, RawInputs};

fn market(name: &str, code: &str, venue: &str, venue_id: &str) -> MarketConfig {
    MarketConfig {
        name: name.to_string(),
        code: code.to_string(),
        venue: venue.to_string(),
        venue_id: venue_id.to_string(),
        country: "US".to_string(),
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        window: AnalysisWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
        ),
        markets: vec![
            market("Boston", "BOS", "Arena One", "V1"),
            market("Toronto", "TOR", "Arena Two", "V2"),
        ],
        market_aliases: [("Boston, MA".to_string(), "BOS".to_string())]
            .into_iter()
            .collect(),
        sections: vec![
            SectionConfig {
                label: "Upper Bowl".to_string(),
                aliases: vec!["UB".to_string()],
            },
            SectionConfig {
                label: "Lower Bowl".to_string(),
                aliases: vec![],
            },
            SectionConfig {
                label: "Club".to_string(),
                aliases: vec!["club seats".to_string()],
            },
        ],
        weather: WeatherThresholds::default(),
        inputs: InputConfig::default(),
        output: OutputConfig {
            dir: "unused".into(),
            format: OutputFormat::Csv,
        },
    }
}

fn sale(date: &str, venue: &str, section: &str, tickets: &str, revenue: &str) -> RawTicketSale {
    RawTicketSale {
        event_date: Some(date.to_string()),
        venue_id: Some(venue.to_string()),
        section: Some(section.to_string()),
        tickets_sold: Some(tickets.to_string()),
        revenue: Some(revenue.to_string()),
        ..RawTicketSale::default()
    }
}

fn capacity(venue: &str, section: &str, cap: &str) -> RawSectionCapacity {
    RawSectionCapacity {
        venue_id: Some(venue.to_string()),
        section: Some(section.to_string()),
        section_capacity: Some(cap.to_string()),
        ..RawSectionCapacity::default()
    }
}

fn reading(market: &str, ts: &str, temp: &str) -> RawWeatherObservation {
    RawWeatherObservation {
        market: Some(market.to_string()),
        timestamp: Some(ts.to_string()),
        temperature: Some(temp.to_string()),
        relative_humidity: Some("75".to_string()),
        precipitation: Some("0".to_string()),
        wind_speed: Some("4".to_string()),
        ..RawWeatherObservation::default()
    }
}

fn inputs() -> RawInputs {
    RawInputs {
        ticket_sales: vec![
            sale("2025-02-01", "V1", "Club", "100", "8000"),
            sale("2025-02-01", "v1", "club seats", "50", "4500"),
            sale("2025-01-15", "V1", "Upper Bowl", "0", "0"),
            sale("2025-01-20", "V2", "Lower Bowl", "900", "27000"),
            sale("2025-01-20", "V2", "Lower Bowl", "900", "27000"),
            sale("2025-01-21", "V2", "Club", "-4", "100"),
            sale("2025-01-22", "V2", "Upper Bowl", "10", "250"),
        ],
        section_capacity: vec![
            capacity("V1", "Club", "200"),
            capacity("V1", "Upper Bowl", "5000"),
            capacity("V1", "Lower Bowl", "3000"),
            capacity("V2", "Lower Bowl", "800"),
            capacity("V2", "Club", "150"),
        ],
        weather: vec![
            reading("Boston", "2025-02-01T18:00", "-3"),
            reading("BOS", "2025-02-01T19:00", "-1"),
            reading("Toronto", "2025-01-20T19:00", "2"),
            reading("Seattle", "2025-01-20T19:00", "8"),
        ],
    }
}

fn pipeline() -> Pipeline {
    Pipeline::from_config(config()).expect("valid config")
}

#[test]
fn test_grain_uniqueness_sums_batches() {
    let output = pipeline().run(&inputs()).expect("run succeeds");

    let club = output
        .schema
        .fact_ticket_sales
        .iter()
        .find(|f| f.venue_id == "V1" && f.section == "Club")
        .expect("club fact row");
    assert_eq!(club.tickets_sold, 150);
    assert_eq!(club.revenue, dec!(12500));
    assert_eq!(club.avg_price, Some(dec!(83.33)));
    assert_eq!(club.section_capacity, 200);
    assert_eq!(club.utilization, Some(dec!(0.75)));

    let keys: BTreeSet<String> = output
        .schema
        .fact_ticket_sales
        .iter()
        .map(|f| f.key())
        .collect();
    assert_eq!(keys.len(), output.schema.fact_ticket_sales.len());
}

#[test]
fn test_conservation_of_tickets_and_revenue() {
    let output = pipeline().run(&inputs()).expect("run succeeds");

    // Accepted sales: 100 + 50 + 0 + 900 (duplicate collapsed). V2/Upper Bowl has no capacity.
    let tickets: i64 = output
        .schema
        .fact_ticket_sales
        .iter()
        .map(|f| f.tickets_sold)
        .sum();
    assert_eq!(tickets, 1050);

    let integration = output
        .summary
        .sources
        .iter()
        .find(|s| s.source == Source::Integration)
        .expect("integration stats");
    assert_eq!(integration.accepted, 4);
    assert_eq!(integration.quarantined, 1);
}

#[test]
fn test_quarantine_report_names_rules() {
    let output = pipeline().run(&inputs()).expect("run succeeds");

    let rules: BTreeSet<Rule> = output.quarantine.rows.iter().map(|q| q.rule).collect();
    assert!(rules.contains(&Rule::NegativeTickets));
    assert!(rules.contains(&Rule::NoCapacityReference));
    assert!(rules.contains(&Rule::UnknownMarket));
    assert_eq!(output.quarantine.total, 3);
    assert_eq!(output.summary.quarantined_by_rule.get(&Rule::NegativeTickets), Some(&1));
}

#[test]
fn test_safe_division_on_zero_tickets() {
    let output = pipeline().run(&inputs()).expect("run succeeds");

    let empty = output
        .schema
        .fact_ticket_sales
        .iter()
        .find(|f| f.section == "Upper Bowl")
        .expect("zero-ticket fact row");
    assert_eq!(empty.tickets_sold, 0);
    assert_eq!(empty.avg_price, None);
    assert_eq!(empty.utilization, Some(dec!(0)));
}

#[test]
fn test_over_capacity_is_flagged_not_clamped() {
    let output = pipeline().run(&inputs()).expect("run succeeds");

    let lower = output
        .schema
        .fact_ticket_sales
        .iter()
        .find(|f| f.venue_id == "V2" && f.section == "Lower Bowl")
        .expect("over-capacity fact row");
    assert_eq!(lower.utilization, Some(dec!(1.125)));
    assert_eq!(output.summary.over_capacity_rows, 1);
}

#[test]
fn test_referential_completeness() {
    let output = pipeline().run(&inputs()).expect("run succeeds");
    let schema = &output.schema;

    let sections: BTreeSet<(&str, &str)> = schema
        .dim_section
        .iter()
        .map(|s| (s.venue_id.as_str(), s.section.as_str()))
        .collect();
    let venues: BTreeSet<&str> = schema.dim_venue.iter().map(|v| v.venue_id.as_str()).collect();
    let markets: BTreeSet<&str> = schema.dim_market.iter().map(|m| m.market.as_str()).collect();

    for fact in &schema.fact_ticket_sales {
        assert!(sections.contains(&(fact.venue_id.as_str(), fact.section.as_str())));
        assert!(venues.contains(fact.venue_id.as_str()));
    }
    for day in &schema.dim_weather {
        assert!(markets.contains(day.market.as_str()));
    }
    assert_eq!(schema.dim_date.len(), 59);
}

#[test]
fn test_weather_optionality() {
    let output = pipeline().run(&inputs()).expect("run succeeds");

    let no_weather_day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
    let fact = output
        .schema
        .fact_ticket_sales
        .iter()
        .find(|f| f.event_date == no_weather_day)
        .expect("sale without weather is kept");
    assert_eq!(fact.venue_id, "V1");
    assert!(!output
        .schema
        .dim_weather
        .iter()
        .any(|w| w.market == "BOS" && w.event_date == no_weather_day));

    let wide = output
        .schema
        .fact_sales_with_weather
        .iter()
        .find(|f| f.event_date == no_weather_day)
        .expect("wide row");
    assert!(wide.avg_temp_c.is_none());

    let with_weather = output
        .schema
        .fact_sales_with_weather
        .iter()
        .find(|f| f.section == "Club" && f.market == "BOS")
        .expect("club wide row");
    assert_eq!(with_weather.avg_temp_c, Some(-2.0));
    assert_eq!(with_weather.freezing_hours, Some(2));
    assert_eq!(output.summary.facts_with_weather, 2);
}

#[test]
fn test_capacity_conflict_aborts_without_output() {
    let mut raw = inputs();
    raw.section_capacity.push(capacity("V1", "Upper Bowl", "4800"));

    let result = pipeline().run(&raw);

    match result {
        Err(PipelineError::CapacityConflict(conflicts)) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].venue_id, "V1");
            assert_eq!(conflicts[0].section, "Upper Bowl");
            assert_eq!(conflicts[0].capacities, vec![4800, 5000]);
        }
        other => panic!("expected capacity conflict, got {other:?}"),
    }
}

#[test]
fn test_blank_capacity_value_aborts_run() {
    let raw = RawInputs {
        ticket_sales: vec![sale("2025-02-01", "V1", "Club", "10", "100")],
        section_capacity: vec![RawSectionCapacity {
            origin: Some("capacity.csv:2".to_string()),
            section_capacity: None,
            ..capacity("V1", "Club", "200")
        }],
        weather: Vec::new(),
    };

    match pipeline().run(&raw) {
        Err(PipelineError::IncompleteReference {
            input,
            origin,
            key,
            field,
        }) => {
            assert_eq!(input, Source::SectionCapacity);
            assert_eq!(origin, "capacity.csv:2");
            assert_eq!(key, "V1/Club");
            assert_eq!(field, "section_capacity");
        }
        other => panic!("expected incomplete reference, got {other:?}"),
    }
}

#[test]
fn test_undecodable_sale_is_quarantined_and_run_continues() {
    let mut raw = inputs();
    raw.ticket_sales.push(RawTicketSale {
        origin: Some("sales.csv:9".to_string()),
        defect: Some("invalid utf-8 in field 2".to_string()),
        ..sale("2025-02-01", "V1", "Club", "5", "400")
    });

    let output = pipeline().run(&raw).expect("run succeeds");
    let garbled: Vec<_> = output
        .quarantine
        .rows
        .iter()
        .filter(|q| q.rule == Rule::InvalidEncoding)
        .collect();
    assert_eq!(garbled.len(), 1);
    assert_eq!(garbled[0].origin.as_deref(), Some("sales.csv:9"));

    let tickets: i64 = output
        .schema
        .fact_ticket_sales
        .iter()
        .map(|f| f.tickets_sold)
        .sum();
    assert_eq!(tickets, 1050);
}

#[test]
fn test_weather_stats_count_readings() {
    let output = pipeline().run(&inputs()).expect("run succeeds");

    let weather = output
        .summary
        .sources
        .iter()
        .find(|s| s.source == Source::Weather)
        .expect("weather stats");
    assert_eq!(weather.read, 4);
    assert_eq!(weather.accepted, 3);
    assert_eq!(weather.quarantined, 1);
    assert_eq!(weather.read, weather.accepted + weather.quarantined);
    assert_eq!(output.summary.weather_days, 2);
    assert_eq!(output.schema.dim_weather.len(), 2);
}

#[test]
fn test_idempotent_reruns() {
    let first = pipeline().run(&inputs()).expect("first run");
    let second = pipeline().run(&inputs()).expect("second run");
    assert_eq!(first, second);

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    first
        .publish(&WarehouseWriter::new(dir_a.path(), OutputFormat::Csv))
        .unwrap();
    second
        .publish(&WarehouseWriter::new(dir_b.path(), OutputFormat::Csv))
        .unwrap();

    for name in ["dim_market.csv", "dim_date.csv", "fact_ticket_sales.csv", "run_summary.json"] {
        let a = std::fs::read(dir_a.path().join(name)).unwrap();
        let b = std::fs::read(dir_b.path().join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }
}

#[test]
fn test_inverted_window_is_rejected() {
    let mut cfg = config();
    cfg.window = AnalysisWindow::new(
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
    );
    assert!(matches!(
        Pipeline::from_config(cfg),
        Err(PipelineError::InvalidWindow { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_run_matches_sequential() {
    let pipeline = Arc::new(pipeline());
    let raw = Arc::new(inputs());

    let sequential = pipeline.run(&raw).expect("sequential run");
    let concurrent = Arc::clone(&pipeline)
        .run_concurrent(Arc::clone(&raw))
        .await
        .expect("concurrent run");

    assert_eq!(sequential, concurrent);
}
