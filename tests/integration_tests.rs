use chrono::NaiveDate;
use podium::{run_queries, Answer, MedalRow, MedalType, PodiumError, Query, Registry};
use std::io;

const MEDALLISTS: &str = "\
name,gender,birth_date,country,medal_type,medal_date,discipline,event
SMITH John,Male,4/7/1995,Canada,Gold,3/8/2024,Swimming,Men's 200m Freestyle
SMITH John,Male,4/7/1995,Canada,Silver,28/7/2024,Swimming,Men's 100m Freestyle
SMITH John,Male,4/7/1995,Canada,Gold,27/7/2024,Swimming,Men's 4x100m Relay
SMITH John,Male,4/7/1995,Canada,Silver,1/8/2024,Swimming,Men's 4x200m Relay
SMITH John,Male,4/7/1995,Canada,Gold,10/8/2024,Swimming,Men's 400m Medley
DOE Jane,Female,12/11/2001,Kenya,Bronze Medal,2024-08-05,Athletics,\"Women's 1500m, Final\"
";

fn run(registry: &Registry, queries: &str) -> String {
    let mut output = Vec::new();
    run_queries(registry, queries.as_bytes(), &mut output).unwrap();
    String::from_utf8(output).unwrap()
}

fn loaded() -> Registry {
    let mut registry = Registry::new();
    let applied = registry.ingest(MEDALLISTS.as_bytes()).unwrap();
    assert_eq!(applied, 6);
    registry
}

#[test]
fn ingest_groups_rows_by_athlete() {
    let registry = loaded();

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.find("SMITH John").unwrap().total_medals(), 5);
    let jane = registry.find("DOE Jane").unwrap();
    assert_eq!(jane.total_medals(), 1);
    assert_eq!(jane.medals()[0].event(), "Women's 1500m, Final");
    assert_eq!(jane.medals()[0].date(), NaiveDate::from_ymd_opt(2024, 8, 5).unwrap());
}

#[test]
fn gold_query_lists_medals_in_insertion_order() {
    let registry = loaded();

    let output = run(&registry, "SMITH John,ouro\nFIM\n");
    assert_eq!(
        output,
        "SMITH John, MASCULINO. Nascimento: 4/7/1995. Pais: Canada\n\
         GOLD - Swimming - Men's 200m Freestyle - 03/08/2024\n\
         GOLD - Swimming - Men's 4x100m Relay - 27/07/2024\n\
         GOLD - Swimming - Men's 400m Medley - 10/08/2024\n\
         \n"
    );
}

#[test]
fn query_type_is_case_insensitive() {
    let registry = loaded();
    assert_eq!(
        run(&registry, "SMITH John,OURO\nFIM\n"),
        run(&registry, "SMITH John,Ouro\nFIM\n")
    );
}

#[test]
fn missing_medal_type_is_reported() {
    let registry = loaded();

    let output = run(&registry, "DOE Jane , prata\nFIM\n");
    assert_eq!(
        output,
        "DOE Jane, FEMININO. Nascimento: 12/11/2001. Pais: Kenya\n\
         Nao possui medalha deSILVER\n\
         \n"
    );
}

#[test]
fn unknown_athlete() {
    let registry = loaded();

    let output = run(&registry, "BOLT Usain,ouro\nFIM\n");
    assert_eq!(output, "Medalhista BOLT Usain nao encontrado\n\n");
}

#[test]
fn sentinel_stops_the_loop() {
    let registry = loaded();

    let output = run(&registry, "FIM\nSMITH John,ouro\n");
    assert_eq!(output, "");
}

#[test]
fn malformed_queries_are_skipped() {
    let registry = loaded();

    let output = run(&registry, "nonsense\n\nBOLT Usain,tin\nBOLT Usain,bronze\n");
    assert_eq!(output, "Medalhista BOLT Usain nao encontrado\n\n");
}

#[test]
fn malformed_rows_are_skipped() {
    let input = "\
name,gender,birth_date,country,medal_type,medal_date,discipline,event
BAD Row,Male,not a date,Peru,Gold,3/8/2024,Judo,-60kg
SHORT Row,Male
ODD Medal,Male,1/1/2000,Peru,Platinum,3/8/2024,Judo,-66kg
GOOD Row,Female,1/1/2000,Peru,Bronze,3/8/2024,Judo,-48kg
";
    let mut registry = Registry::new();

    assert_eq!(registry.ingest(input.as_bytes()).unwrap(), 1);
    assert_eq!(registry.len(), 1);
    assert!(registry.find("GOOD Row").is_some());
}

#[test]
fn consume_caps_medals_per_athlete() {
    let day = |d| NaiveDate::from_ymd_opt(2024, 8, d).unwrap();
    let rows = (1..=9).map(|n| MedalRow {
        name: "BUSY Athlete".to_string(),
        gender: "Female".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1999, 1, 1).unwrap(),
        country: "Japan".to_string(),
        medal_type: MedalType::Silver,
        medal_date: day(n),
        discipline: "Gymnastics".to_string(),
        event: format!("event {}", n),
    });
    let mut registry = Registry::new();
    registry.consume(rows);

    let athlete = registry.find("BUSY Athlete").unwrap();
    assert_eq!(athlete.total_medals(), 8);
    assert!(!athlete.medal_report(MedalType::Silver).contains("event 9"));

    let query = Query::parse("BUSY Athlete,silver").unwrap();
    match registry.answer(&query) {
        Answer::Found { report, .. } => assert_eq!(report.lines().count(), 8),
        Answer::NotFound { .. } => panic!("athlete should be registered"),
    }
}

#[test]
fn missing_file_is_an_error() {
    let mut registry = Registry::new();
    let result = registry.ingest_path(std::path::Path::new("/nonexistent/medallists.csv"));
    assert!(result.is_err());
    assert!(registry.is_empty());
}

/// Serves its rows, then fails every read.
struct FailingSource {
    rows: &'static [u8],
}

impl io::Read for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rows.is_empty() {
            return Err(io::Error::new(io::ErrorKind::Other, "disk went away"));
        }
        let n = self.rows.len().min(buf.len());
        buf[..n].copy_from_slice(&self.rows[..n]);
        self.rows = &self.rows[n..];
        Ok(n)
    }
}

#[test]
fn read_failure_keeps_rows_already_loaded() {
    let source = FailingSource {
        rows: b"name,gender,birth_date,country,medal_type,medal_date,discipline,event\n\
                EARLY Bird,Female,1/1/2000,Peru,Gold,3/8/2024,Judo,-48kg\n",
    };
    let mut registry = Registry::new();

    let result = registry.ingest(source);
    assert!(matches!(result, Err(PodiumError::Csv(_))));
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.find("EARLY Bird").unwrap().medal_report(MedalType::Gold),
        "GOLD - Judo - -48kg - 03/08/2024\n"
    );
}
