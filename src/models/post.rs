use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// Sort order of a subreddit listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Hot => "hot",
            ListingType::New => "new",
            ListingType::Top => "top",
            ListingType::Rising => "rising",
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(ListingType::Hot),
            "new" => Ok(ListingType::New),
            "top" => Ok(ListingType::Top),
            "rising" => Ok(ListingType::Rising),
            other => Err(format!("unknown listing type: {}", other)),
        }
    }
}

/// One feed item, before any filtering
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CandidatePost {
    #[serde(deserialize_with = "null_as_default")]
    pub subreddit: String,
    /// Set by the poller, not present in the feed payload.
    #[serde(skip)]
    pub listing_type: ListingType,
    pub banned_by: Option<String>,
    #[serde(deserialize_with = "lenient_count")]
    pub likes: Option<i64>,
    #[serde(deserialize_with = "lenient_count")]
    pub view_count: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub score: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub hidden: bool,
    pub post_hint: Option<String>,
    pub url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub permalink: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subreddit_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hide_score: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub quarantine: bool,
}

impl CandidatePost {
    /// Only posts the feed marks as images are downloaded.
    pub fn is_image(&self) -> bool {
        self.post_hint.as_deref() == Some("image")
    }
}

/// Top level of a `/r/{sub}/{listing}.json` response
#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub data: CandidatePost,
}

impl Listing {
    /// Unwrap the listing into its posts, tagged with the listing they came from.
    pub fn into_posts(self, listing_type: ListingType) -> Vec<CandidatePost> {
        self.data
            .children
            .into_iter()
            .map(|child| CandidatePost {
                listing_type,
                ..child.data
            })
            .collect()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// `likes` is the viewer's vote on some listings (true/false/null), a number on others.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::Bool(b) => Some(i64::from(b)),
        _ => None,
    })
}
