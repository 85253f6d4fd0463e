//! Board entities stored in the replicated document.
//!
//! Every entity is serialized as one JSON object (camelCase keys) and stored
//! under its id in the matching replicated map. Missing fields fall back to
//! defaults and unknown fields are kept in `extra`, so logs written by older
//! or newer builds keep loading.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::SystemTime;
use uuid::Uuid;

use crate::collection::Collection;

/// Fields a replica does not know about, preserved verbatim.
pub type ExtraFields = Map<String, Value>;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Fresh globally unique entity id.
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

/// 2D position in board (world) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Edge-inclusive containment test.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x
            && p.x <= self.x + self.width
            && p.y >= self.y
            && p.y <= self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    Sticky,
    Text,
    Shape,
    Icon,
    Image,
    Framework,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    Rectangle,
    Circle,
    Triangle,
    Star,
    Diamond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Draft,
    Investigating,
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effort {
    S,
    M,
    L,
    XL,
}

/// Logical sub-board a card or area belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lens {
    #[default]
    Default,
    Engineering,
    Design,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// CSS-style font weight, either a keyword or a numeric weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FontWeight {
    Numeric(u16),
    Named(String),
}

impl FontWeight {
    pub fn normal() -> Self {
        FontWeight::Named("normal".into())
    }

    pub fn bold() -> Self {
        FontWeight::Named("bold".into())
    }
}

impl Default for FontWeight {
    fn default() -> Self {
        Self::normal()
    }
}

/// RICE prioritization inputs, each on a 0-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiceScore {
    pub reach: f64,
    pub impact: f64,
    pub confidence: f64,
    pub effort: f64,
}

impl Default for RiceScore {
    fn default() -> Self {
        Self {
            reach: 5.0,
            impact: 5.0,
            confidence: 5.0,
            effort: 5.0,
        }
    }
}

/// Anything stored as a whole value in one of the replicated maps.
pub trait Entity: Serialize + serde::de::DeserializeOwned + Clone + PartialEq {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

/// A spatial card: sticky note, text, shape, icon, image or framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Card {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CardType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_type: Option<ShapeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub board: Lens,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    pub color: String,
    pub text_align: TextAlign,
    pub font_weight: FontWeight,
    pub font_style: String,
    pub text_color: String,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub source: String,
    pub effort: Option<Effort>,
    pub rice: RiceScore,
    pub attachments: Vec<String>,
    /// Ids of cards blocking this one. May reference deleted cards.
    pub blocked_by: Vec<String>,
    pub timeline_month: Option<String>,
    pub votes: u32,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Default for Card {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: CardType::Sticky,
            shape_type: None,
            icon_name: None,
            image_url: None,
            board: Lens::Default,
            position: Point::new(100.0, 100.0),
            width: 150.0,
            height: 100.0,
            font_size: 14.0,
            color: "#fef08a".into(),
            text_align: TextAlign::Left,
            font_weight: FontWeight::normal(),
            font_style: "normal".into(),
            text_color: "#422006".into(),
            title: String::new(),
            description: String::new(),
            status: Status::Draft,
            source: String::new(),
            effort: None,
            rice: RiceScore::default(),
            attachments: Vec::new(),
            blocked_by: Vec::new(),
            timeline_month: None,
            votes: 0,
            created_at: 0,
            updated_at: 0,
            extra: ExtraFields::new(),
        }
    }
}

impl Entity for Card {
    const COLLECTION: Collection = Collection::Cards;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Partial card description used when creating a card.
///
/// Every `None` is filled with the per-type default in [`CardDraft::build`].
#[derive(Debug, Clone, Default)]
pub struct CardDraft {
    pub kind: Option<CardType>,
    pub shape_type: Option<ShapeType>,
    pub icon_name: Option<String>,
    pub image_url: Option<String>,
    pub board: Option<Lens>,
    pub position: Option<Point>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub font_size: Option<f64>,
    pub color: Option<String>,
    pub text_align: Option<TextAlign>,
    pub font_weight: Option<FontWeight>,
    pub font_style: Option<String>,
    pub text_color: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub source: Option<String>,
    pub effort: Option<Effort>,
    pub rice: Option<RiceScore>,
    pub attachments: Vec<String>,
    pub blocked_by: Vec<String>,
    pub timeline_month: Option<String>,
}

impl CardDraft {
    pub fn of_kind(kind: CardType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Point::new(x, y));
        self
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn on_board(mut self, lens: Lens) -> Self {
        self.board = Some(lens);
        self
    }

    /// Materialize the draft into a card with a fresh id.
    ///
    /// `current_lens` is used when the draft does not name a board.
    pub fn build(self, current_lens: Lens) -> Card {
        let kind = self.kind.unwrap_or_default();
        let font_size = self.font_size.unwrap_or(14.0);
        let now = now_millis();

        let color = self.color.unwrap_or_else(|| match kind {
            CardType::Text | CardType::Image | CardType::Icon => "transparent".into(),
            _ => "#fef08a".into(),
        });
        let text_color = self.text_color.unwrap_or_else(|| match kind {
            CardType::Sticky => "#422006".into(),
            _ => "#1f2937".into(),
        });
        let font_weight = self.font_weight.unwrap_or_else(|| {
            if kind == CardType::Text && font_size > 24.0 {
                FontWeight::bold()
            } else {
                FontWeight::normal()
            }
        });
        let title = self.title.unwrap_or_else(|| match kind {
            CardType::Text => "Type here...".into(),
            CardType::Sticky => "New Sticky".into(),
            _ => String::new(),
        });

        Card {
            id: new_entity_id(),
            kind,
            shape_type: self.shape_type,
            icon_name: self.icon_name,
            image_url: self.image_url,
            board: self.board.unwrap_or(current_lens),
            position: self.position.unwrap_or(Point::new(100.0, 100.0)),
            width: self.width.unwrap_or(150.0),
            height: self.height.unwrap_or(100.0),
            font_size,
            color,
            text_align: self.text_align.unwrap_or_default(),
            font_weight,
            font_style: self.font_style.unwrap_or_else(|| "normal".into()),
            text_color,
            title,
            description: self.description.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            source: self.source.unwrap_or_default(),
            effort: self.effort,
            rice: self.rice.unwrap_or_default(),
            attachments: self.attachments,
            blocked_by: self.blocked_by,
            timeline_month: self.timeline_month,
            votes: 0,
            created_at: now,
            updated_at: now,
            extra: ExtraFields::new(),
        }
    }
}

/// Labeled theme container grouping cards on one board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Area {
    pub id: String,
    pub board: Lens,
    pub label: String,
    /// Cached membership. Geometry is authoritative, see [`crate::geometry`].
    pub card_ids: Vec<String>,
    pub bounds: Bounds,
    pub color: String,
    pub is_locked: bool,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Default for Area {
    fn default() -> Self {
        Self {
            id: String::new(),
            board: Lens::Default,
            label: String::new(),
            card_ids: Vec::new(),
            bounds: Bounds::default(),
            color: "#6366f1".into(),
            is_locked: false,
            extra: ExtraFields::new(),
        }
    }
}

impl Area {
    pub fn new(board: Lens, label: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            id: new_entity_id(),
            board,
            label: label.into(),
            bounds,
            ..Self::default()
        }
    }
}

impl Entity for Area {
    const COLLECTION: Collection = Collection::Areas;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Directional link between two cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Connector {
    pub id: String,
    pub from_card_id: String,
    pub to_card_id: String,
    pub is_blocker: bool,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Default for Connector {
    fn default() -> Self {
        Self {
            id: String::new(),
            from_card_id: String::new(),
            to_card_id: String::new(),
            is_blocker: false,
            extra: ExtraFields::new(),
        }
    }
}

impl Entity for Connector {
    const COLLECTION: Collection = Collection::Connectors;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Freehand stroke. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Drawing {
    pub id: String,
    pub points: Vec<Point>,
    pub color: String,
    pub width: f64,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Default for Drawing {
    fn default() -> Self {
        Self {
            id: String::new(),
            points: Vec::new(),
            color: "#6366f1".into(),
            width: 2.0,
            extra: ExtraFields::new(),
        }
    }
}

impl Drawing {
    pub fn new(points: Vec<Point>, color: impl Into<String>, width: f64) -> Self {
        Self {
            id: new_entity_id(),
            points,
            color: color.into(),
            width,
            extra: ExtraFields::new(),
        }
    }
}

impl Entity for Drawing {
    const COLLECTION: Collection = Collection::Drawings;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A remote participant's live cursor. Presence only, never replicated
/// through the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub id: String,
    pub name: String,
    pub color: String,
    pub position: Point,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sticky_defaults() {
        let card = CardDraft::default().build(Lens::Design);
        assert_eq!(card.kind, CardType::Sticky);
        assert_eq!(card.board, Lens::Design);
        assert_eq!(card.position, Point::new(100.0, 100.0));
        assert_eq!(card.color, "#fef08a");
        assert_eq!(card.text_color, "#422006");
        assert_eq!(card.title, "New Sticky");
        assert_eq!(card.rice, RiceScore::default());
        assert_eq!(card.created_at, card.updated_at);
        assert!(!card.id.is_empty());
    }

    #[test]
    fn test_large_text_card_is_bold_and_transparent() {
        let mut draft = CardDraft::of_kind(CardType::Text);
        draft.font_size = Some(32.0);
        let card = draft.build(Lens::Default);

        assert_eq!(card.font_weight, FontWeight::bold());
        assert_eq!(card.color, "transparent");
        assert_eq!(card.text_color, "#1f2937");
        assert_eq!(card.title, "Type here...");
    }

    #[test]
    fn test_draft_board_overrides_current_lens() {
        let card = CardDraft::default()
            .on_board(Lens::Data)
            .build(Lens::Engineering);
        assert_eq!(card.board, Lens::Data);
    }

    #[test]
    fn test_card_json_uses_camel_case() {
        let card = CardDraft::default().titled("Ship it").build(Lens::Default);
        let json = serde_json::to_value(&card).unwrap();

        assert_eq!(json["type"], "sticky");
        assert_eq!(json["title"], "Ship it");
        assert!(json.get("blockedBy").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("shapeType").is_none());
    }

    #[test]
    fn test_old_card_json_loads_with_defaults() {
        let json = r#"{"id":"c1","type":"shape","title":"Legacy","position":{"x":1.0,"y":2.0}}"#;
        let card: Card = serde_json::from_str(json).unwrap();

        assert_eq!(card.id, "c1");
        assert_eq!(card.kind, CardType::Shape);
        assert_eq!(card.position, Point::new(1.0, 2.0));
        assert_eq!(card.width, 150.0);
        assert!(card.blocked_by.is_empty());
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let json = r#"{"id":"c1","title":"Future","priorityLane":"now","reactions":{"+1":3}}"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.extra["priorityLane"], "now");

        let back = serde_json::to_value(&card).unwrap();
        assert_eq!(back["priorityLane"], "now");
        assert_eq!(back["reactions"]["+1"], 3);
    }

    #[test]
    fn test_font_weight_accepts_numbers() {
        let json = r#"{"id":"c1","fontWeight":600}"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.font_weight, FontWeight::Numeric(600));
    }

    #[test]
    fn test_bounds_contains_edges() {
        let b = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert!(b.contains(Point::new(0.0, 0.0)));
        assert!(b.contains(Point::new(10.0, 10.0)));
        assert!(!b.contains(Point::new(10.1, 5.0)));
    }
}
