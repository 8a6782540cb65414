use serde::{Deserialize, Serialize};

/// 画布上的坐标，Miro 以元素中心定位
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemData {
    #[serde(default)]
    pub title: Option<String>,
}

/// 画布元素（frame、image 等）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub data: Option<ItemData>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl BoardItem {
    pub fn title(&self) -> &str {
        self.data
            .as_ref()
            .and_then(|d| d.title.as_deref())
            .filter(|t| !t.is_empty())
            .unwrap_or("Unnamed Frame")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// 上传图片时 multipart `data` 字段的内容
#[derive(Debug, Serialize)]
pub(crate) struct ImagePlacement {
    pub position: Position,
}
