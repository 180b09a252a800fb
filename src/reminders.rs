use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::errors::{AppError, AppResult};

const FALLBACK_PLACE_TYPE: &str = "store";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Groceries,
    Shopping,
    Pharmacy,
    Services,
    Other,
    Unrecognized(String),
}

impl Category {
    pub fn parse(label: &str) -> Self {
        match label {
            "Groceries" => Category::Groceries,
            "Shopping" => Category::Shopping,
            "Pharmacy" => Category::Pharmacy,
            "Services" => Category::Services,
            "Other" => Category::Other,
            other => Category::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Groceries => "Groceries",
            Category::Shopping => "Shopping",
            Category::Pharmacy => "Pharmacy",
            Category::Services => "Services",
            Category::Other => "Other",
            Category::Unrecognized(label) => label,
        }
    }

    pub fn place_type(&self) -> &'static str {
        match self {
            Category::Groceries => "grocery_or_supermarket",
            Category::Shopping => "shopping_mall",
            Category::Pharmacy => "pharmacy",
            Category::Services => "store",
            Category::Other => "point_of_interest",
            Category::Unrecognized(_) => FALLBACK_PLACE_TYPE,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Category::parse(&label))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub title: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        category: Category,
    ) -> AppResult<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(AppError::Validation("reminder title must not be empty".into()));
        }
        Ok(Self {
            id: id.into(),
            title,
            category,
            created_at: None,
        })
    }
}

pub fn retain_valid(reminders: Vec<Reminder>) -> Vec<Reminder> {
    reminders
        .into_iter()
        .filter(|reminder| {
            let keep = !reminder.title.trim().is_empty();
            if !keep {
                warn!(
                    target: "reminders",
                    id = %reminder.id,
                    "dropping reminder with blank title"
                );
            }
            keep
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    pub category: Category,
    pub reminders: Vec<Reminder>,
}

impl CategoryGroup {
    pub fn titles(&self) -> Vec<&str> {
        self.reminders.iter().map(|r| r.title.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryIndex {
    groups: Vec<CategoryGroup>,
}

impl CategoryIndex {
    pub fn group_by_category(reminders: &[Reminder]) -> Self {
        let mut groups: Vec<CategoryGroup> = Vec::new();
        for reminder in reminders {
            match groups
                .iter_mut()
                .find(|group| group.category == reminder.category)
            {
                Some(group) => group.reminders.push(reminder.clone()),
                None => groups.push(CategoryGroup {
                    category: reminder.category.clone(),
                    reminders: vec![reminder.clone()],
                }),
            }
        }
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn get(&self, category: &Category) -> Option<&CategoryGroup> {
        self.groups.iter().find(|group| &group.category == category)
    }

    pub fn groups(&self) -> impl Iterator<Item = &CategoryGroup> {
        self.groups.iter()
    }
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn list_active(&self) -> AppResult<Vec<Reminder>>;
}

#[derive(Clone, Default)]
pub struct MemoryReminderStore {
    reminders: Arc<Mutex<Vec<Reminder>>>,
}

impl MemoryReminderStore {
    pub fn new(reminders: Vec<Reminder>) -> Self {
        Self {
            reminders: Arc::new(Mutex::new(reminders)),
        }
    }

    pub fn insert(&self, reminder: Reminder) {
        self.reminders.lock().push(reminder);
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut reminders = self.reminders.lock();
        let before = reminders.len();
        reminders.retain(|r| r.id != id);
        reminders.len() != before
    }

    pub fn replace_all(&self, reminders: Vec<Reminder>) {
        *self.reminders.lock() = reminders;
    }
}

#[async_trait]
impl ReminderStore for MemoryReminderStore {
    async fn list_active(&self) -> AppResult<Vec<Reminder>> {
        Ok(self.reminders.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reminder(id: &str, title: &str, category: Category) -> Reminder {
        Reminder::new(id, title, category).unwrap()
    }

    #[test]
    fn maps_categories_to_place_types() {
        assert_eq!(Category::Groceries.place_type(), "grocery_or_supermarket");
        assert_eq!(Category::Shopping.place_type(), "shopping_mall");
        assert_eq!(Category::Pharmacy.place_type(), "pharmacy");
        assert_eq!(Category::Services.place_type(), "store");
        assert_eq!(Category::Other.place_type(), "point_of_interest");
        assert_eq!(Category::parse("Hardware").place_type(), "store");
    }

    #[test]
    fn category_labels_survive_serde() {
        let parsed: Category = serde_json::from_str("\"Pharmacy\"").unwrap();
        assert_eq!(parsed, Category::Pharmacy);
        let unknown: Category = serde_json::from_str("\"Garden\"").unwrap();
        assert_eq!(unknown, Category::Unrecognized("Garden".into()));
        assert_eq!(serde_json::to_string(&unknown).unwrap(), "\"Garden\"");
    }

    #[test]
    fn groups_preserve_insertion_order() {
        let reminders = vec![
            reminder("1", "Buy milk", Category::Groceries),
            reminder("2", "Pick up prescription", Category::Pharmacy),
            reminder("3", "Eggs", Category::Groceries),
        ];
        let index = CategoryIndex::group_by_category(&reminders);

        assert_eq!(index.len(), 2);
        let groceries = index.get(&Category::Groceries).unwrap();
        assert_eq!(groceries.titles(), vec!["Buy milk", "Eggs"]);
        assert!(index.get(&Category::Shopping).is_none());
        assert!(index.groups().all(|group| !group.reminders.is_empty()));
    }

    #[test]
    fn empty_reminders_yield_no_categories() {
        let index = CategoryIndex::group_by_category(&[]);
        assert!(index.is_empty());
        assert_eq!(index.groups().count(), 0);
    }

    #[test]
    fn rejects_blank_titles() {
        assert!(Reminder::new("1", "   ", Category::Other).is_err());
        let kept = retain_valid(vec![
            Reminder {
                id: "blank".into(),
                title: "".into(),
                category: Category::Other,
                created_at: None,
            },
            reminder("2", "Stamps", Category::Services),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "2");
    }

    #[tokio::test]
    async fn memory_store_reflects_latest_changes() {
        let store = MemoryReminderStore::default();
        store.insert(reminder("1", "Buy milk", Category::Groceries));
        store.insert(reminder("2", "Socks", Category::Shopping));
        assert!(store.remove("1"));
        assert!(!store.remove("missing"));

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Socks");
    }
}
