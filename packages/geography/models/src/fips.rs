//! US state and county FIPS code utilities.
//!
//! EPA monitor files carry state and county codes as bare integers (and
//! occasionally the non-numeric `"CC"` for Canadian sites); census ids carry
//! them zero-padded. These helpers normalize between the two.

/// US state FIPS codes for the 50 states + DC.
pub const STATE_FIPS: &[&str] = &[
    "01", "02", "04", "05", "06", "08", "09", "10", "11", "12", "13", "15", "16", "17", "18", "19",
    "20", "21", "22", "23", "24", "25", "26", "27", "28", "29", "30", "31", "32", "33", "34", "35",
    "36", "37", "38", "39", "40", "41", "42", "44", "45", "46", "47", "48", "49", "50", "51", "53",
    "54", "55", "56",
];

/// State codes at or above this value are outside the US (Mexican sites in
/// the EPA files use 80).
pub const FOREIGN_STATE_CODE_MIN: u16 = 80;

/// EPA state code used for Canadian monitoring sites.
pub const CANADA_STATE_CODE: &str = "CC";

/// Parses a raw EPA state code into a US state number.
///
/// Returns `None` for Canadian (`"CC"`), Mexican (`>= 80`), and otherwise
/// unparseable codes.
#[must_use]
pub fn us_state_code(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    if raw == CANADA_STATE_CODE {
        return None;
    }
    raw.parse::<u16>()
        .ok()
        .filter(|code| *code < FOREIGN_STATE_CODE_MIN)
}

/// Two-digit zero-padded state FIPS.
#[must_use]
pub fn state_fips(code: u16) -> String {
    format!("{code:02}")
}

/// Five-digit county FIPS built from raw state and county codes.
#[must_use]
pub fn county_fips(state: u16, county: u16) -> String {
    format!("{state:02}{county:03}")
}

/// Builds a five-digit county FIPS from the raw string codes found in EPA
/// files (e.g. `"6"` + `"37"` -> `"06037"`).
///
/// Returns `None` when either code is not numeric.
#[must_use]
pub fn county_fips_from_raw(state: &str, county: &str) -> Option<String> {
    let state = state.trim().parse::<u16>().ok()?;
    let county = county.trim().parse::<u16>().ok()?;
    Some(county_fips(state, county))
}

/// Maps a two-digit FIPS code to the full state name.
///
/// Returns `"Unknown"` for unrecognized codes.
#[must_use]
pub fn state_name(fips: &str) -> &'static str {
    match fips {
        "01" => "Alabama",
        "02" => "Alaska",
        "04" => "Arizona",
        "05" => "Arkansas",
        "06" => "California",
        "08" => "Colorado",
        "09" => "Connecticut",
        "10" => "Delaware",
        "11" => "District of Columbia",
        "12" => "Florida",
        "13" => "Georgia",
        "15" => "Hawaii",
        "16" => "Idaho",
        "17" => "Illinois",
        "18" => "Indiana",
        "19" => "Iowa",
        "20" => "Kansas",
        "21" => "Kentucky",
        "22" => "Louisiana",
        "23" => "Maine",
        "24" => "Maryland",
        "25" => "Massachusetts",
        "26" => "Michigan",
        "27" => "Minnesota",
        "28" => "Mississippi",
        "29" => "Missouri",
        "30" => "Montana",
        "31" => "Nebraska",
        "32" => "Nevada",
        "33" => "New Hampshire",
        "34" => "New Jersey",
        "35" => "New Mexico",
        "36" => "New York",
        "37" => "North Carolina",
        "38" => "North Dakota",
        "39" => "Ohio",
        "40" => "Oklahoma",
        "41" => "Oregon",
        "42" => "Pennsylvania",
        "44" => "Rhode Island",
        "45" => "South Carolina",
        "46" => "South Dakota",
        "47" => "Tennessee",
        "48" => "Texas",
        "49" => "Utah",
        "50" => "Vermont",
        "51" => "Virginia",
        "53" => "Washington",
        "54" => "West Virginia",
        "55" => "Wisconsin",
        "56" => "Wyoming",
        _ => "Unknown",
    }
}
