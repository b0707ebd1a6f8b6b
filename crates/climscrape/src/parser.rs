use crate::types::{DailyRecord, DateKey, MonthPage, MonthlyDataset, YearMonth};

use scraper::{ElementRef, Html, Node};

const FIELDS_PER_ROW: usize = 3;
const MISSING_MARKER: char = 'M';
const ESTIMATED_MARKER: char = 'E';
const SUMMARY_MARKER: &str = "Sum";

/// A flattened view of the document: element boundaries and text, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    Open(String),
    Text(String),
    Close(String),
}

pub fn markup_events(html: &str) -> Vec<MarkupEvent> {
    let document = Html::parse_document(html);
    let mut events = Vec::new();
    walk(document.root_element(), &mut events);
    events
}

fn walk(element: ElementRef, events: &mut Vec<MarkupEvent>) {
    let name = element.value().name().to_string();
    events.push(MarkupEvent::Open(name.clone()));

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            walk(child_element, events);
        } else if let Node::Text(text) = child.value() {
            let text: &str = text;
            events.push(MarkupEvent::Text(text.to_string()));
        }
    }

    events.push(MarkupEvent::Close(name));
}

pub fn parse_month_page(html: &str, period: YearMonth, previous_title: Option<&str>) -> MonthPage {
    let mut parser = TableParser::new(period, previous_title);
    for event in markup_events(html) {
        parser.feed(&event);
    }
    parser.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Between,
    DayLabel,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    InTitle,
    InBody(Cell),
    /// The summary rows have started; nothing further on the page is data.
    Finished,
}

/// Collects the cells of one table row.
///
/// Starts closed so cells appearing before the first `<tr>` are ignored.
#[derive(Debug)]
struct RowAssembler {
    key: Option<DateKey>,
    fields: Vec<String>,
    columns: usize,
    low_quality: bool,
}

impl RowAssembler {
    fn closed() -> Self {
        Self {
            key: None,
            fields: Vec::with_capacity(FIELDS_PER_ROW),
            columns: FIELDS_PER_ROW,
            low_quality: false,
        }
    }

    fn start_row(&mut self) {
        self.key = None;
        self.fields.clear();
        self.columns = 0;
        self.low_quality = false;
    }

    fn set_key(&mut self, key: DateKey) {
        self.key = Some(key);
    }

    /// Classifies one data cell. Returns the finished record when the row is complete and clean.
    ///
    /// A blank cell still takes its column but leaves the row incomplete.
    fn push_cell(&mut self, text: &str) -> Option<(DateKey, DailyRecord)> {
        if self.columns >= FIELDS_PER_ROW {
            return None;
        }

        if text.is_empty() || text.contains(MISSING_MARKER) || text.contains(ESTIMATED_MARKER) {
            self.low_quality = true;
        } else {
            self.fields.push(text.to_string());
        }
        self.columns += 1;

        if self.columns < FIELDS_PER_ROW {
            return None;
        }

        let key = self.key.take();
        let fields = std::mem::take(&mut self.fields);
        let low_quality = std::mem::replace(&mut self.low_quality, false);

        if low_quality {
            log::debug!(
                "Dropping row {} with missing or estimated values",
                key.as_ref().map(ToString::to_string).unwrap_or_default()
            );
            return None;
        }

        let key = key?;
        let [max, min, mean]: [String; FIELDS_PER_ROW] = fields.try_into().ok()?;
        Some((key, DailyRecord { max, min, mean }))
    }
}

/// Turns the markup events of one month-page into a [`MonthPage`].
///
/// One parser per page. It never fails: markup it does not recognise is skipped.
#[derive(Debug)]
pub struct TableParser {
    period: YearMonth,
    previous_title: Option<String>,
    state: State,
    row: RowAssembler,
    cell_text: String,
    title: Option<String>,
    same_month: bool,
    dataset: MonthlyDataset,
}

impl TableParser {
    pub fn new(period: YearMonth, previous_title: Option<&str>) -> Self {
        Self {
            period,
            previous_title: previous_title.map(str::to_string),
            state: State::Idle,
            row: RowAssembler::closed(),
            cell_text: String::new(),
            title: None,
            same_month: false,
            dataset: MonthlyDataset::new(),
        }
    }

    pub fn feed(&mut self, event: &MarkupEvent) {
        self.state = self.transition(self.state, event);
    }

    pub fn finish(self) -> MonthPage {
        MonthPage {
            title: self.title,
            dataset: self.dataset,
            same_month: self.same_month,
        }
    }

    fn transition(&mut self, state: State, event: &MarkupEvent) -> State {
        match (state, event) {
            (State::Idle, MarkupEvent::Open(tag)) => match tag.as_str() {
                "title" if self.title.is_none() => State::InTitle,
                "tbody" => State::InBody(Cell::Between),
                _ => state,
            },
            (State::InTitle, MarkupEvent::Text(text)) => {
                self.record_title(text);
                State::Idle
            }
            (State::InTitle, MarkupEvent::Close(_)) => State::Idle,

            (State::InBody(_), MarkupEvent::Text(text)) if text.contains(SUMMARY_MARKER) => {
                State::Finished
            }
            (State::InBody(cell), MarkupEvent::Open(tag)) => match (cell, tag.as_str()) {
                (_, "tr") => {
                    self.cell_text.clear();
                    self.row.start_row();
                    State::InBody(Cell::Between)
                }
                (Cell::Between, "abbr") => State::InBody(Cell::DayLabel),
                (Cell::Between, "td") => {
                    self.cell_text.clear();
                    State::InBody(Cell::Data)
                }
                _ => state,
            },
            (State::InBody(cell), MarkupEvent::Close(tag)) => match (cell, tag.as_str()) {
                (_, "tbody") => State::Idle,
                (Cell::DayLabel, "abbr") => State::InBody(Cell::Between),
                (Cell::Data, "td") => {
                    self.close_data_cell();
                    State::InBody(Cell::Between)
                }
                _ => state,
            },
            (State::InBody(Cell::DayLabel), MarkupEvent::Text(text)) => {
                let label = text.trim();
                if !label.is_empty() {
                    self.row.set_key(DateKey::new(self.period, label));
                }
                state
            }
            (State::InBody(Cell::Data), MarkupEvent::Text(text)) => {
                self.cell_text.push_str(text);
                state
            }

            _ => state,
        }
    }

    fn record_title(&mut self, text: &str) {
        let title = text.trim();
        if self.previous_title.as_deref() == Some(title) {
            self.same_month = true;
        }
        self.title = Some(title.to_string());
    }

    fn close_data_cell(&mut self) {
        let text = std::mem::take(&mut self.cell_text);
        if let Some((key, record)) = self.row.push_cell(text.trim())
            && self.dataset.insert(key.clone(), record).is_some()
        {
            log::warn!("Day {} appeared twice on the page, keeping the later row", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn february() -> YearMonth {
        YearMonth::new(2021, 2).unwrap()
    }

    fn key(day: &str) -> DateKey {
        DateKey::new(february(), day)
    }

    fn row(day: &str, cells: [&str; 3]) -> String {
        format!(
            r#"<tr><th scope="row"><abbr title="February {day}, 2021">{day}</abbr></th><td>{}</td><td>{}</td><td>{}</td><td>0.0</td><td>12.4</td></tr>"#,
            cells[0], cells[1], cells[2]
        )
    }

    fn page(title: &str, rows: &[String]) -> String {
        format!(
            r#"<html><head><title>{title}</title></head><body>
            <table><thead><tr><th>Day</th><th>Max Temp</th><th>Min Temp</th><th>Mean Temp</th></tr></thead>
            <tbody>{}<tr><th>Sum</th><td>5.0</td><td>1.0</td><td>2.0</td></tr></tbody></table>
            </body></html>"#,
            rows.join("\n")
        )
    }

    #[test]
    fn test_single_row_produces_record() {
        let html = page("Daily Data Report for February 2021", &[row("5", ["-3.2", "-10.1", "-6.5"])]);

        let result = parse_month_page(&html, february(), None);

        assert_eq!(result.dataset.len(), 1);
        let record = result.dataset.get(&key("5")).expect("Should have day 5");
        assert_eq!(record.max, "-3.2");
        assert_eq!(record.min, "-10.1");
        assert_eq!(record.mean, "-6.5");
        assert_eq!(key("5").to_string(), "2021-02-5");
        assert!(!result.same_month);
    }

    #[test]
    fn test_feed_events_directly() {
        let mut parser = TableParser::new(february(), None);
        let events = [
            MarkupEvent::Open("tbody".into()),
            MarkupEvent::Open("tr".into()),
            MarkupEvent::Open("abbr".into()),
            MarkupEvent::Text("5".into()),
            MarkupEvent::Close("abbr".into()),
            MarkupEvent::Open("td".into()),
            MarkupEvent::Text("-3.2".into()),
            MarkupEvent::Close("td".into()),
            MarkupEvent::Open("td".into()),
            MarkupEvent::Text("-10.1".into()),
            MarkupEvent::Close("td".into()),
            MarkupEvent::Open("td".into()),
            MarkupEvent::Text("-6.5".into()),
            MarkupEvent::Close("td".into()),
            MarkupEvent::Close("tr".into()),
            MarkupEvent::Close("tbody".into()),
        ];
        for event in &events {
            parser.feed(event);
        }

        let result = parser.finish();
        assert_eq!(
            result.dataset.get(&key("5")),
            Some(&DailyRecord {
                max: "-3.2".to_string(),
                min: "-10.1".to_string(),
                mean: "-6.5".to_string(),
            })
        );
    }

    #[test]
    fn test_well_formed_rows_yield_one_record_each() {
        let rows: Vec<String> = (1..=28)
            .map(|day| row(&format!("{:02}", day), ["1.5", "-2.5", "-0.5"]))
            .collect();
        let html = page("Daily Data Report for February 2021", &rows);

        let result = parse_month_page(&html, february(), None);

        assert_eq!(result.dataset.len(), 28);
        assert!(result.dataset.get(&key("01")).is_some());
        assert!(result.dataset.get(&key("28")).is_some());
    }

    #[test]
    fn test_flagged_rows_are_dropped_without_disturbing_neighbours() {
        let rows = vec![
            row("1", ["1.0", "-1.0", "0.0"]),
            row("2", ["2.0", "LegendM", "1.0"]),
            row("3", ["3.0", "-3.0", "0.0"]),
            row("4", ["4.0E", "-4.0", "0.0"]),
            row("5", ["LegendMM", "LegendMM", "LegendMM"]),
            row("6", ["6.0", "-6.0", "0.0"]),
        ];
        let html = page("Daily Data Report for February 2021", &rows);

        let result = parse_month_page(&html, february(), None);

        let days: Vec<&str> = result.dataset.keys().map(DateKey::day_label).collect();
        assert_eq!(days, vec!["1", "3", "6"]);
        assert_eq!(result.dataset.get(&key("3")).unwrap().max, "3.0");
        assert_eq!(result.dataset.get(&key("6")).unwrap().min, "-6.0");
    }

    #[test]
    fn test_blank_cell_takes_its_column_and_drops_the_row() {
        for blank in 0..3 {
            let mut cells = ["-3.2", "-10.1", "-6.5"];
            cells[blank] = "&nbsp;";
            let html = page("Daily Data Report for February 2021", &[row("1", cells)]);

            let result = parse_month_page(&html, february(), None);

            assert!(
                result.dataset.is_empty(),
                "Blank cell at column {blank} should drop the row, got {:?}",
                result.dataset
            );
        }
    }

    #[test]
    fn test_blank_cell_does_not_disturb_next_row() {
        let rows = vec![
            row("1", ["-3.2", "", "-6.5"]),
            row("2", ["2.0", "-2.0", "0.0"]),
        ];
        let html = page("Daily Data Report for February 2021", &rows);

        let result = parse_month_page(&html, february(), None);

        assert_eq!(result.dataset.len(), 1);
        assert_eq!(result.dataset.get(&key("2")).unwrap().max, "2.0");
    }

    #[test]
    fn test_summary_rows_are_not_data() {
        let html = r#"<html><head><title>Report</title></head><body><table><tbody>
            <tr><th><abbr>1</abbr></th><td>1.0</td><td>-1.0</td><td>0.0</td></tr>
            <tr><th>Sum</th><td>9.0</td><td>9.0</td><td>9.0</td></tr>
            <tr><th><abbr>Avg</abbr></th><td>1.0</td><td>-1.0</td><td>0.0</td></tr>
            </tbody></table></body></html>"#;

        let result = parse_month_page(html, february(), None);

        assert_eq!(result.dataset.len(), 1);
        assert!(result.dataset.get(&key("1")).is_some());
    }

    #[test]
    fn test_cells_outside_body_are_ignored() {
        let html = r#"<html><head><title>Report</title></head><body>
            <table><thead><tr><th><abbr>1</abbr></th><td>9.0</td><td>9.0</td><td>9.0</td></tr></thead></table>
            </body></html>"#;

        let result = parse_month_page(html, february(), None);

        assert!(result.dataset.is_empty());
        assert_eq!(result.title.as_deref(), Some("Report"));
    }

    #[test]
    fn test_row_without_day_label_is_skipped() {
        let html = r#"<html><body><table><tbody>
            <tr><th></th><td>1.0</td><td>-1.0</td><td>0.0</td></tr>
            <tr><th><abbr>2</abbr></th><td>2.0</td><td>-2.0</td><td>0.0</td></tr>
            </tbody></table></body></html>"#;

        let result = parse_month_page(html, february(), None);

        assert_eq!(result.dataset.len(), 1);
        assert!(result.dataset.get(&key("2")).is_some());
    }

    #[test]
    fn test_same_month_signal() {
        let html = page("Daily Data Report for January 1840", &[row("1", ["1.0", "-1.0", "0.0"])]);

        let first = parse_month_page(&html, february(), None);
        assert!(!first.same_month);

        let repeated = parse_month_page(&html, february(), first.title.as_deref());
        assert!(repeated.same_month);

        let other = parse_month_page(&html, february(), Some("Daily Data Report for February 1840"));
        assert!(!other.same_month);
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let rows = vec![row("1", ["1.0", "-1.0", "0.0"]), row("2", ["M", "-2.0", "0.0"])];
        let html = page("Daily Data Report for February 2021", &rows);

        let first = parse_month_page(&html, february(), None);
        let second = parse_month_page(&html, february(), None);

        assert_eq!(first.dataset, second.dataset);
    }

    #[test]
    fn test_parse_month_page_from_fixture() {
        let html = fs::read_to_string("fixtures/daily_data_2021_02.html")
            .expect("Failed to read sample HTML file");

        let result = parse_month_page(&html, february(), None);

        assert_eq!(
            result.title.as_deref(),
            Some("Daily Data Report for February 2021 - Climate - Environment and Climate Change Canada")
        );
        assert_eq!(result.dataset.len(), 5);
        assert!(result.dataset.get(&key("03")).is_none(), "Day 3 has a missing mean");
        assert!(result.dataset.get(&key("05")).is_none(), "Day 5 is estimated");

        let first = result.dataset.get(&key("01")).expect("Should have day 1");
        assert_eq!(first.max, "-3.2");
        assert_eq!(first.min, "-10.1");
        assert_eq!(first.mean, "-6.7");
    }
}
