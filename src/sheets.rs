//! Google Sheets client for audience data import
//!
//! Reads the shared audience sheet through the Sheets values API using an
//! API key. When the key is missing or the sheet is unreachable, a built-in
//! example dataset is returned so the import pipeline stays usable.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::logging::log_sheets;

const SHEET_ID: &str = "1X5hXnmSKNYtN1jdSQGPXXJ2Fnu8gNEXyFqqIUl31L1A";
const MAIN_SHEET: &str = "WESTY Audience Example";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// One audience segment as laid out in the sheet
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SheetPersona {
    pub name: String,
    pub percentage: String,
    pub gender_split: String,
    pub device_preference: String,
    pub summary: String,
    pub online_topics: Vec<String>,
    pub social_media: Vec<String>,
    pub media_preferences: Vec<String>,
    pub influencers: Vec<String>,
    pub brand_preferences: Vec<String>,
    pub job_titles: Vec<String>,
    pub locations: Vec<String>,
    pub bio_keywords: Vec<String>,
    pub youtube_channels: Vec<String>,
    pub insights: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    properties: SpreadsheetProperties,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Debug, Clone)]
pub struct SheetsClient {
    client: Client,
    api_key: Option<String>,
}

impl SheetsClient {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        SheetsClient { client, api_key }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch audience personas from the sheet, optionally filtered by a
    /// case-insensitive name substring. Falls back to the example dataset
    /// when unconfigured or on any fetch error.
    pub async fn get_persona_data(&self, name_filter: Option<&str>) -> Vec<SheetPersona> {
        let personas = match self.fetch_sheet_personas().await {
            Ok(personas) if !personas.is_empty() => personas,
            Ok(_) => {
                log_sheets(None, "No data found in sheet, using example dataset");
                vec![Self::mock_data()]
            }
            Err(e) => {
                log_sheets(None, &format!("Sheet fetch failed ({}), using example dataset", e));
                vec![Self::mock_data()]
            }
        };

        match name_filter {
            Some(filter) => {
                let filter = filter.to_lowercase();
                personas
                    .into_iter()
                    .filter(|p| p.name.to_lowercase().contains(&filter))
                    .collect()
            }
            None => personas,
        }
    }

    async fn fetch_sheet_personas(&self) -> Result<Vec<SheetPersona>, String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| "Google Sheets API key not configured".to_string())?;

        let url = format!(
            "{}/{}/values/{}",
            SHEETS_API_BASE,
            SHEET_ID,
            urlencode(&format!("{}!A:L", MAIN_SHEET))
        );

        let response = self
            .client
            .get(&url)
            .query(&[("key", api_key.as_str())])
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Sheets API error ({}): {}", status, error_text));
        }

        let body: ValuesResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {}", e))?;

        // Row 0 is the sheet title, row 1 the headers
        let personas = body
            .values
            .iter()
            .skip(2)
            .filter(|row| row.first().map(|c| !c.trim().is_empty()).unwrap_or(false))
            .enumerate()
            .map(|(index, row)| Self::parse_row(row, index))
            .collect();

        Ok(personas)
    }

    fn parse_row(row: &[String], index: usize) -> SheetPersona {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

        // First column packs "Name [demographics]: summary"
        let first_column = cell(0);
        let (name_part, summary) = match first_column.split_once(':') {
            Some((name, summary)) => (name.trim().to_string(), summary.trim().to_string()),
            None => (
                if first_column.trim().is_empty() {
                    format!("Persona {}", index + 1)
                } else {
                    first_column.trim().to_string()
                },
                String::new(),
            ),
        };

        SheetPersona {
            gender_split: extract_stat(&name_part, "Male"),
            device_preference: extract_stat(&name_part, "iOS"),
            name: name_part,
            percentage: if cell(1).is_empty() { "0%".to_string() } else { cell(1).to_string() },
            summary,
            online_topics: parse_comma_separated(cell(2)),
            social_media: parse_comma_separated(cell(3)),
            media_preferences: parse_comma_separated(cell(4)),
            influencers: parse_comma_separated(cell(5)),
            brand_preferences: parse_comma_separated(cell(6)),
            job_titles: parse_comma_separated(cell(7)),
            locations: parse_comma_separated(cell(8)),
            bio_keywords: parse_comma_separated(cell(9)),
            youtube_channels: parse_comma_separated(cell(10)),
            insights: parse_comma_separated(cell(11)),
        }
    }

    pub async fn test_connection(&self) -> ConnectionTest {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                return ConnectionTest {
                    success: false,
                    message: "Google Sheets API key not configured. Using example data.".to_string(),
                    title: None,
                }
            }
        };

        let url = format!("{}/{}", SHEETS_API_BASE, SHEET_ID);
        let result = self
            .client
            .get(&url)
            .query(&[
                ("key", api_key.as_str()),
                ("fields", "properties.title,sheets.properties.title"),
            ])
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<SpreadsheetResponse>().await {
                    Ok(body) => ConnectionTest {
                        success: true,
                        message: "Successfully connected to Google Sheets".to_string(),
                        title: Some(body.properties.title),
                    },
                    Err(e) => ConnectionTest {
                        success: false,
                        message: format!("Failed to connect to Google Sheets: {}", e),
                        title: None,
                    },
                }
            }
            Ok(response) => ConnectionTest {
                success: false,
                message: format!("Failed to connect to Google Sheets: {}", response.status()),
                title: None,
            },
            Err(e) => ConnectionTest {
                success: false,
                message: format!("Failed to connect to Google Sheets: {}", e),
                title: None,
            },
        }
    }

    /// Built-in example dataset, used whenever the live sheet is unavailable
    pub fn mock_data() -> SheetPersona {
        SheetPersona {
            name: "Informed Professionals".to_string(),
            percentage: "14%".to_string(),
            gender_split: "75% Male".to_string(),
            device_preference: "62% iOS".to_string(),
            summary: "Informed Professional Londoners are deeply engaged in the vibrant life of London, with a keen interest in politics and cultural discourse.".to_string(),
            online_topics: to_strings(&[
                "People and Society", "Children", "Parents", "Mental Health", "Experiences",
                "Wellbeing", "Diversity", "Teaching", "Books", "Law and Gov", "Business",
                "News", "Politics", "Movies",
            ]),
            social_media: to_strings(&["LinkedIn", "X", "Instagram", "YouTube", "The Independent"]),
            media_preferences: to_strings(&[
                "Private Eye", "Guardian", "QI", "The Onion", "The Independent", "Radio 4",
                "BBC Politics", "Tech Crunch", "WSJ", "LBC", "VICE", "Mashable",
                "Evening Standard", "BBC Newsnight", "Economist",
            ]),
            influencers: to_strings(&[
                "David Mitchell", "Charlie Brooker", "Sadiq Khan", "Dara O'Brien",
                "Eddie Izzard", "Robert Peston", "Alastair Campbell", "Jeremy Corbyn",
                "Ed Miliband", "Nick Robinson", "Caroline Lucas", "Giles Coren",
                "Secret Footballer", "Jonathan Pie",
            ]),
            brand_preferences: to_strings(&[
                "Amnesty International", "NASA", "Glastonbury", "Met Office", "UN",
                "Channel 4", "YouGov", "National Theatre", "SW Rail", "Labour Party",
            ]),
            job_titles: to_strings(&[
                "Director", "Writer", "Editor", "Founder", "Head", "Artist", "Creative",
                "Producer", "CEO", "Journalist", "Actor", "Activist", "Singer",
                "Presenter", "Trainer", "Comedian", "Investor", "Chef",
            ]),
            locations: to_strings(&[
                "London", "Essex", "Hertfordshire", "Kent", "Manchester", "Bristol",
                "Enfield", "Surrey", "Cambridge", "Norfolk", "Wales",
            ]),
            bio_keywords: to_strings(&[
                "Business", "Music", "Health", "Food", "Community", "Digital", "Art",
                "Events", "Local", "Marketing", "Family", "Professional", "Travel",
                "Tech", "Development",
            ]),
            youtube_channels: to_strings(&[
                "Mrwhosetheboss", "Tech Spurt", "History Hit", "Tom Scott", "The Athletic",
                "Sky Sports Premier League", "TNT Sports", "COPA90", "talkSPORT",
                "ZONEofTECH", "Munya Chawawe", "QI", "Private Eye", "Guardian News",
                "BBC News", "Novara Media", "TED",
            ]),
            insights: to_strings(&[
                "Professional Skew", "Intelligent/Educated", "Keen Learners",
                "Politically Engaged", "Mainstream Media", "Successful financially",
                "Creative", "Multi Dimensional", "Innovative and interested in tech",
                "Left Leaning", "Global outlook", "Comedy and Satire", "Rock Music",
                "Alcohol", "Art and design",
            ]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Pull a "NN% Keyword" stat out of the packed name column, e.g. "75% Male"
fn extract_stat(text: &str, keyword: &str) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for window in tokens.windows(2) {
        let (stat, word) = (window[0], window[1]);
        if word == keyword
            && stat.ends_with('%')
            && stat.len() > 1
            && stat[..stat.len() - 1].chars().all(|c| c.is_ascii_digit())
        {
            return format!("{} {}", stat, word);
        }
    }
    String::new()
}

fn parse_comma_separated(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Percent-encode a sheet range for the values API path segment
fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'!' | b':' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_separated_trims_and_drops_empties() {
        assert_eq!(
            parse_comma_separated("LinkedIn, X , ,Instagram"),
            vec!["LinkedIn", "X", "Instagram"]
        );
        assert!(parse_comma_separated("").is_empty());
    }

    #[test]
    fn test_parse_row_splits_name_and_summary() {
        let row: Vec<String> = vec![
            "Informed Professionals 75% Male 62% iOS: Engaged Londoners".to_string(),
            "14%".to_string(),
            "News, Politics".to_string(),
        ];
        let persona = SheetsClient::parse_row(&row, 0);
        assert_eq!(persona.name, "Informed Professionals 75% Male 62% iOS");
        assert_eq!(persona.summary, "Engaged Londoners");
        assert_eq!(persona.percentage, "14%");
        assert_eq!(persona.gender_split, "75% Male");
        assert_eq!(persona.device_preference, "62% iOS");
        assert_eq!(persona.online_topics, vec!["News", "Politics"]);
        assert!(persona.social_media.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_client_falls_back_to_example_data() {
        let client = SheetsClient::new(None);
        let personas = client.get_persona_data(None).await;
        assert_eq!(personas.len(), 1);
        assert_eq!(personas[0].name, "Informed Professionals");

        let filtered = client.get_persona_data(Some("informed")).await;
        assert_eq!(filtered.len(), 1);

        let empty = client.get_persona_data(Some("nonexistent")).await;
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_connection_reports_missing_key() {
        let client = SheetsClient::new(None);
        let result = client.test_connection().await;
        assert!(!result.success);
        assert!(result.message.contains("not configured"));
    }
}
