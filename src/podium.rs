use chrono::NaiveDate;
use log::{debug, error, info, warn};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Medals kept per athlete; anything past this is dropped on insertion.
pub const MAX_MEDALS: usize = 8;

/// Line that ends the interactive query loop.
pub const SENTINEL: &str = "FIM";

#[derive(Error, Debug)]
pub enum PodiumError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown medal type '{0}'")]
    UnknownMedalType(String),

    #[error("malformed query '{0}', expected '<name>,<medal type>'")]
    MalformedQuery(String),
}

pub type Result<T> = std::result::Result<T, PodiumError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum MedalType {
    Gold,
    Silver,
    Bronze,
}

impl MedalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MedalType::Gold => "GOLD",
            MedalType::Silver => "SILVER",
            MedalType::Bronze => "BRONZE",
        }
    }
}

impl fmt::Display for MedalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MedalType {
    type Err = PodiumError;

    /// Accepts English and Portuguese tokens in any case, with or without
    /// the trailing " medal" used by the published data set.
    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().to_lowercase();
        let token = token.strip_suffix(" medal").unwrap_or(&token);
        match token {
            "gold" | "ouro" => Ok(MedalType::Gold),
            "silver" | "prata" => Ok(MedalType::Silver),
            "bronze" => Ok(MedalType::Bronze),
            _ => Err(PodiumError::UnknownMedalType(s.to_string())),
        }
    }
}

impl TryFrom<String> for MedalType {
    type Error = PodiumError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Medal {
    medal_type: MedalType,
    date: NaiveDate,
    discipline: String,
    event: String,
}

impl Medal {
    pub fn new(medal_type: MedalType, date: NaiveDate, discipline: &str, event: &str) -> Self {
        Medal {
            medal_type,
            date,
            discipline: discipline.to_string(),
            event: event.to_string(),
        }
    }

    pub fn medal_type(&self) -> MedalType {
        self.medal_type
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn discipline(&self) -> &str {
        &self.discipline
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl fmt::Display for Medal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}",
            self.medal_type,
            self.discipline,
            self.event,
            self.date.format("%d/%m/%Y")
        )
    }
}

#[derive(Debug, Clone)]
pub struct Athlete {
    name: String,
    gender: String,
    birth_date: NaiveDate,
    country: String,
    // never grows past MAX_MEDALS
    medals: Vec<Medal>,
}

impl Athlete {
    pub fn new(name: &str, gender: &str, birth_date: NaiveDate, country: &str) -> Self {
        Athlete {
            name: name.to_string(),
            gender: gender.to_string(),
            birth_date,
            country: country.to_string(),
            medals: Vec::with_capacity(MAX_MEDALS),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gender(&self) -> &str {
        &self.gender
    }

    pub fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn medals(&self) -> &[Medal] {
        &self.medals
    }

    /// Stores the medal if there is room left and returns the medal count.
    /// A full collection silently ignores the medal.
    pub fn add_medal(&mut self, medal: Medal) -> usize {
        if self.medals.len() < MAX_MEDALS {
            self.medals.push(medal);
        } else {
            debug!(
                "athlete '{}' already holds {} medals, dropping '{}'",
                self.name, MAX_MEDALS, medal
            );
        }
        self.medals.len()
    }

    pub fn total_medals(&self) -> usize {
        self.medals.len()
    }

    /// One line per medal of the given type, in insertion order.
    pub fn medal_report(&self, medal_type: MedalType) -> String {
        let lines: Vec<String> = self
            .medals
            .iter()
            .filter(|medal| medal.medal_type() == medal_type)
            .map(|medal| format!("{}\n", medal))
            .collect();

        if lines.is_empty() {
            format!("Nao possui medalha de{}\n", medal_type)
        } else {
            lines.concat()
        }
    }

    fn display_gender(&self) -> &'static str {
        if self.gender.eq_ignore_ascii_case("FEMININO")
            || self.gender.eq_ignore_ascii_case("FEMALE")
        {
            "FEMININO"
        } else {
            "MASCULINO"
        }
    }
}

impl fmt::Display for Athlete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}. Nascimento: {}. Pais: {}",
            self.name,
            self.display_gender(),
            self.birth_date.format("%-d/%-m/%Y"),
            self.country
        )
    }
}

/// Accepts `D/M/YYYY` (padding optional) and ISO `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> std::result::Result<NaiveDate, chrono::ParseError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
}

fn deserialize_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).map_err(|e| serde::de::Error::custom(format!("invalid date '{}': {}", raw, e)))
}

/// One line of the medallists file, fields in file order.
#[derive(Debug, Clone, Deserialize)]
pub struct MedalRow {
    pub name: String,
    pub gender: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub birth_date: NaiveDate,
    pub country: String,
    pub medal_type: MedalType,
    #[serde(deserialize_with = "deserialize_date")]
    pub medal_date: NaiveDate,
    pub discipline: String,
    pub event: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub medal_type: MedalType,
}

impl Query {
    /// Parses `<athlete name>,<medal type>`. The name may itself hold commas;
    /// only the last one separates the fields.
    pub fn parse(line: &str) -> Result<Self> {
        let (name, medal_type) = line
            .rsplit_once(',')
            .ok_or_else(|| PodiumError::MalformedQuery(line.to_string()))?;
        Ok(Query {
            name: name.trim().to_string(),
            medal_type: medal_type.parse()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Found { description: String, report: String },
    NotFound { name: String },
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // report already ends with a newline
            Answer::Found { description, report } => writeln!(f, "{}\n{}", description, report),
            Answer::NotFound { name } => writeln!(f, "Medalhista {} nao encontrado\n", name),
        }
    }
}

fn csv_reader() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).trim(csv::Trim::All);
    builder
}

#[derive(Debug, Default)]
pub struct Registry {
    athletes: Vec<Athlete>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn len(&self) -> usize {
        self.athletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.athletes.is_empty()
    }

    /// Athletes in the order they were first seen.
    pub fn iter(&self) -> impl Iterator<Item = &Athlete> {
        self.athletes.iter()
    }

    pub fn find(&self, name: &str) -> Option<&Athlete> {
        self.index.get(name).map(|&idx| &self.athletes[idx])
    }

    /// Returns the athlete registered under `name`, creating it from the
    /// given fields when absent. The first registration's fields win.
    pub fn find_or_create(
        &mut self,
        name: &str,
        gender: &str,
        birth_date: NaiveDate,
        country: &str,
    ) -> &mut Athlete {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                let idx = self.athletes.len();
                self.athletes.push(Athlete::new(name, gender, birth_date, country));
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        &mut self.athletes[idx]
    }

    pub fn consume(&mut self, rows: impl Iterator<Item = MedalRow>) {
        rows.for_each(|row| self.apply_row(row));
    }

    pub fn apply_row(&mut self, row: MedalRow) {
        let medal = Medal::new(row.medal_type, row.medal_date, &row.discipline, &row.event);
        self.find_or_create(&row.name, &row.gender, row.birth_date, &row.country)
            .add_medal(medal);
    }

    /// Reads a headed CSV of medal rows into the registry and returns the
    /// number of rows applied. Rows that cannot be parsed are logged and
    /// skipped; an I/O failure stops ingestion and keeps what was read so far.
    pub fn ingest<R: io::Read>(&mut self, source: R) -> Result<usize> {
        self.ingest_records(csv_reader().from_reader(source))
    }

    pub fn ingest_path(&mut self, path: &Path) -> Result<usize> {
        let applied = self.ingest_records(csv_reader().from_path(path)?)?;
        info!(
            "loaded {} medals for {} athletes from {}",
            applied,
            self.len(),
            path.display()
        );
        Ok(applied)
    }

    fn ingest_records<R: io::Read>(&mut self, mut reader: csv::Reader<R>) -> Result<usize> {
        let mut applied = 0;
        for (line, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    error!("could not read row {}, will be skipped: {}", line + 1, e);
                    continue;
                }
            };
            match record.deserialize::<MedalRow>(None) {
                Ok(row) => {
                    self.apply_row(row);
                    applied += 1;
                }
                Err(e) => error!("could not parse row {}, will be skipped: {}", line + 1, e),
            }
        }
        Ok(applied)
    }

    pub fn answer(&self, query: &Query) -> Answer {
        match self.find(&query.name) {
            Some(athlete) => Answer::Found {
                description: athlete.to_string(),
                report: athlete.medal_report(query.medal_type),
            },
            None => Answer::NotFound {
                name: query.name.clone(),
            },
        }
    }
}

/// Answers query lines from `input` until the sentinel or end of input.
/// Lines that are not valid UTF-8 are logged and skipped.
pub fn run_queries<R: BufRead, W: Write>(
    registry: &Registry,
    input: R,
    mut output: W,
) -> Result<()> {
    for (number, bytes) in input.split(b'\n').enumerate() {
        let line = match String::from_utf8(bytes?) {
            Ok(line) => line,
            Err(e) => {
                warn!("query line {} is not valid UTF-8, will be skipped: {}", number + 1, e);
                continue;
            }
        };
        let line = line.trim();
        if line == SENTINEL {
            break;
        }
        if line.is_empty() {
            continue;
        }
        match Query::parse(line) {
            Ok(query) => write!(output, "{}", registry.answer(&query))?,
            Err(e) => warn!("query will be skipped: {}", e),
        }
    }
    output.flush()?;
    Ok(())
}

#[cfg(test)]
fn date(day: u32, month: u32, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

#[cfg(test)]
fn medal(medal_type: MedalType, day: u32, event: &str) -> Medal {
    Medal::new(medal_type, date(day, 8, 2024), "Swimming", event)
}

#[test]
fn medal_description() {
    let medal = Medal::new(MedalType::Silver, date(3, 8, 2024), "Athletics", "Men's 100m");
    assert_eq!(medal.to_string(), "SILVER - Athletics - Men's 100m - 03/08/2024");
}

#[test]
fn athlete_description() {
    let athlete = Athlete::new("LEDECKY Katie", "Female", date(17, 3, 1997), "United States");
    assert_eq!(
        athlete.to_string(),
        "LEDECKY Katie, FEMININO. Nascimento: 17/3/1997. Pais: United States"
    );
}

#[test]
fn gender_normalization() {
    for gender in ["feminino", "FEMININO", "Feminino", "female"] {
        let athlete = Athlete::new("X", gender, date(1, 1, 2000), "Brazil");
        assert!(athlete.to_string().contains(", FEMININO."));
    }
    for gender in ["Male", "masculino", "", "other"] {
        let athlete = Athlete::new("X", gender, date(1, 1, 2000), "Brazil");
        assert!(athlete.to_string().contains(", MASCULINO."));
    }
}

#[test]
fn add_medal_is_capped() {
    let mut athlete = Athlete::new("PHELPS Michael", "Male", date(30, 6, 1985), "United States");
    for n in 1..=12 {
        let count = athlete.add_medal(medal(MedalType::Gold, n, &format!("event {}", n)));
        assert_eq!(count, n.min(MAX_MEDALS as u32) as usize);
    }
    assert_eq!(athlete.total_medals(), MAX_MEDALS);
}

#[test]
fn ninth_medal_is_absent_from_report() {
    let mut athlete = Athlete::new("A", "Male", date(1, 1, 2000), "France");
    for n in 1..=8 {
        athlete.add_medal(medal(MedalType::Bronze, n, &format!("event {}", n)));
    }
    assert_eq!(athlete.add_medal(medal(MedalType::Gold, 9, "late")), 8);
    assert_eq!(athlete.total_medals(), 8);
    assert_eq!(athlete.medal_report(MedalType::Gold), "Nao possui medalha deGOLD\n");
    assert!(!athlete.medal_report(MedalType::Bronze).contains("late"));
}

#[test]
fn empty_report() {
    let athlete = Athlete::new("A", "Male", date(1, 1, 2000), "France");
    assert_eq!(athlete.total_medals(), 0);
    assert_eq!(athlete.medal_report(MedalType::Gold), "Nao possui medalha deGOLD\n");
    assert_eq!(athlete.medal_report(MedalType::Silver), "Nao possui medalha deSILVER\n");
    assert_eq!(athlete.medal_report(MedalType::Bronze), "Nao possui medalha deBRONZE\n");
}

#[test]
fn report_keeps_insertion_order() {
    let mut athlete = Athlete::new("A", "Male", date(1, 1, 2000), "France");
    athlete.add_medal(medal(MedalType::Gold, 9, "later"));
    athlete.add_medal(medal(MedalType::Silver, 5, "other"));
    athlete.add_medal(medal(MedalType::Gold, 1, "earlier"));

    assert_eq!(
        athlete.medal_report(MedalType::Gold),
        "GOLD - Swimming - later - 09/08/2024\nGOLD - Swimming - earlier - 01/08/2024\n"
    );
}

#[test]
fn medal_type_tokens() {
    assert_eq!("ouro".parse::<MedalType>().unwrap(), MedalType::Gold);
    assert_eq!(" PRATA ".parse::<MedalType>().unwrap(), MedalType::Silver);
    assert_eq!("Bronze".parse::<MedalType>().unwrap(), MedalType::Bronze);
    assert_eq!("Gold Medal".parse::<MedalType>().unwrap(), MedalType::Gold);
    assert!(matches!(
        "platinum".parse::<MedalType>(),
        Err(PodiumError::UnknownMedalType(_))
    ));
}

#[test]
fn date_formats() {
    assert_eq!(parse_date("3/8/2024").unwrap(), date(3, 8, 2024));
    assert_eq!(parse_date("03/08/2024").unwrap(), date(3, 8, 2024));
    assert_eq!(parse_date("2024-08-03").unwrap(), date(3, 8, 2024));
    assert!(parse_date("August 3rd").is_err());
}

#[test]
fn find_or_create_keeps_first_fields() {
    let mut registry = Registry::new();
    let first = registry.find_or_create("SMITH John", "Male", date(1, 2, 1990), "Canada")
        as *const Athlete;
    let second = registry.find_or_create("SMITH John", "Female", date(5, 6, 1995), "Chile")
        as *const Athlete;

    assert!(std::ptr::eq(first, second));
    assert_eq!(registry.len(), 1);
    let athlete = registry.find("SMITH John").unwrap();
    assert_eq!(athlete.gender(), "Male");
    assert_eq!(athlete.country(), "Canada");
    assert_eq!(athlete.birth_date(), date(1, 2, 1990));
}

#[test]
fn find_is_exact() {
    let mut registry = Registry::new();
    registry.find_or_create("SMITH John", "Male", date(1, 2, 1990), "Canada");
    registry.find_or_create("DOE Jane", "Female", date(1, 2, 1991), "Kenya");

    assert!(registry.find("smith john").is_none());
    assert!(registry.find("SMITH").is_none());
    let names: Vec<&str> = registry.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["SMITH John", "DOE Jane"]);
}

#[test]
fn query_parsing() {
    let query = Query::parse("SMITH John , ouro").unwrap();
    assert_eq!(query.name, "SMITH John");
    assert_eq!(query.medal_type, MedalType::Gold);

    assert!(matches!(Query::parse("SMITH John"), Err(PodiumError::MalformedQuery(_))));
    assert!(matches!(Query::parse("SMITH John,tin"), Err(PodiumError::UnknownMedalType(_))));
}

#[test]
fn invalid_utf8_query_is_skipped() {
    let mut output = Vec::new();
    run_queries(&Registry::new(), &b"X\xff,ouro\nBOLT Usain,ouro\nFIM\n"[..], &mut output).unwrap();
    assert_eq!(output, b"Medalhista BOLT Usain nao encontrado\n\n");
}

#[test]
fn answer_formatting() {
    let not_found = Answer::NotFound { name: "NOBODY".to_string() };
    assert_eq!(not_found.to_string(), "Medalhista NOBODY nao encontrado\n\n");

    let found = Answer::Found {
        description: "desc".to_string(),
        report: "line\n".to_string(),
    };
    assert_eq!(found.to_string(), "desc\nline\n\n");
}
