//! Built-in query fixtures: one table set per theme and at least one
//! expected-result variant per (theme, concept). Expected rows are derived
//! from the same tables the player sees, so they cannot drift apart.

use serde_json::json;

use crate::domain::{Row, TableSnapshot, Theme, ALL_CONCEPTS};
use crate::fixtures::{QueryBank, QueryVariant};

/// (id, name, group, score, tag)
type Person = (i64, &'static str, &'static str, i64, Option<&'static str>);
/// (id, owner id, item)
type Link = (i64, i64, &'static str);

struct ThemeData {
  theme: Theme,
  main: &'static str,
  group_col: &'static str,
  score_col: &'static str,
  tag_col: &'static str,
  rel: &'static str,
  rel_owner_col: &'static str,
  rel_item_col: &'static str,
  people: [Person; 6],
  links: [Link; 4],
  /// Row inserted by the INSERT challenge.
  recruit: Person,
  /// Score threshold used by WHERE/DELETE.
  threshold: i64,
  /// Name prefix used by LIKE.
  prefix: &'static str,
}

macro_rules! row {
  ($($k:expr => $v:expr),* $(,)?) => {{
    let mut r = Row::new();
    $( r.insert($k.to_string(), json!($v)); )*
    r
  }};
}

fn themes() -> [ThemeData; 3] {
  [
    ThemeData {
      theme: Theme::Cyberpunk,
      main: "citizens",
      group_col: "district",
      score_col: "credits",
      tag_col: "implant",
      rel: "contracts",
      rel_owner_col: "citizen_id",
      rel_item_col: "target",
      people: [
        (1, "Neo", "Neon Row", 1200, Some("optic")),
        (2, "Trinity", "Neon Row", 3400, None),
        (3, "Kira", "Undercity", 450, Some("neural")),
        (4, "Tank", "Undercity", 800, None),
        (5, "Nova", "Spire", 5200, Some("dermal")),
        (6, "Kane", "Spire", 300, Some("optic")),
      ],
      links: [(1, 1, "Arasaka vault"), (2, 3, "Data spire"), (3, 5, "Orbital relay"), (4, 1, "Black ICE node")],
      recruit: (7, "Zero", "Undercity", 0, None),
      threshold: 1000,
      prefix: "K",
    },
    ThemeData {
      theme: Theme::Fantasy,
      main: "adventurers",
      group_col: "guild",
      score_col: "gold",
      tag_col: "artifact",
      rel: "quests",
      rel_owner_col: "adventurer_id",
      rel_item_col: "quest",
      people: [
        (1, "Aria", "Mages", 150, Some("Staff of Dawn")),
        (2, "Borin", "Warriors", 90, None),
        (3, "Elara", "Mages", 320, None),
        (4, "Grim", "Rogues", 40, Some("Shadow Cloak")),
        (5, "Eldon", "Warriors", 510, Some("Dragon Shield")),
        (6, "Lyra", "Rogues", 75, None),
      ],
      links: [(1, 2, "Slay the troll"), (2, 1, "Find the lost tome"), (3, 5, "Guard the pass"), (4, 4, "Steal the crown")],
      recruit: (7, "Fenn", "Rogues", 10, None),
      threshold: 100,
      prefix: "El",
    },
    ThemeData {
      theme: Theme::RealWorld,
      main: "employees",
      group_col: "department",
      score_col: "salary",
      tag_col: "manager_email",
      rel: "projects",
      rel_owner_col: "employee_id",
      rel_item_col: "title",
      people: [
        (1, "Alice", "Engineering", 98000, Some("cto@example.com")),
        (2, "Bob", "Sales", 54000, None),
        (3, "Carol", "Engineering", 87000, Some("cto@example.com")),
        (4, "Dan", "Support", 42000, None),
        (5, "Carlos", "Sales", 61000, Some("vp@example.com")),
        (6, "Eve", "Support", 45000, Some("ops@example.com")),
      ],
      links: [(1, 1, "Payments API"), (2, 3, "Search rewrite"), (3, 5, "Q3 campaign"), (4, 2, "Partner portal")],
      recruit: (7, "Frank", "Engineering", 70000, None),
      threshold: 60000,
      prefix: "Car",
    },
  ]
}

impl ThemeData {
  fn person_row(&self, p: &Person) -> Row {
    row! {
      "id" => p.0,
      "name" => p.1,
      self.group_col => p.2,
      self.score_col => p.3,
      self.tag_col => p.4,
    }
  }

  fn main_table(&self, people: &[Person]) -> TableSnapshot {
    TableSnapshot { name: self.main.to_string(), rows: people.iter().map(|p| self.person_row(p)).collect() }
  }

  fn rel_table(&self) -> TableSnapshot {
    TableSnapshot {
      name: self.rel.to_string(),
      rows: self
        .links
        .iter()
        .map(|l| row! { "id" => l.0, self.rel_owner_col => l.1, self.rel_item_col => l.2 })
        .collect(),
    }
  }

  fn name_group(&self, p: &Person) -> Row {
    row! { "name" => p.1, self.group_col => p.2 }
  }

  fn variant(&self, brief: String, input: Vec<TableSnapshot>, expected: Vec<Row>) -> QueryVariant {
    QueryVariant { brief, input, expected }
  }

  fn variants_for(&self, concept: &str) -> Vec<QueryVariant> {
    let base = || vec![self.main_table(&self.people)];
    let (main, group, score, tag) = (self.main, self.group_col, self.score_col, self.tag_col);

    match concept {
      "basic SELECT and FROM" => vec![
        self.variant(
          format!("List the name and {group} of everyone in {main}."),
          base(),
          self.people.iter().map(|p| self.name_group(p)).collect(),
        ),
        self.variant(
          format!("Show every column of every row in {main}."),
          base(),
          self.people.iter().map(|p| self.person_row(p)).collect(),
        ),
      ],
      "basic WHERE clause" => vec![self.variant(
        format!("Find everyone in {main} whose {score} is above {}.", self.threshold),
        base(),
        self.people.iter().filter(|p| p.3 > self.threshold).map(|p| self.person_row(p)).collect(),
      )],
      "pattern matching with LIKE" => {
        let mut out = vec![self.variant(
          format!("Find everyone in {main} whose name starts with '{}'.", self.prefix),
          base(),
          self.people.iter().filter(|p| p.1.starts_with(self.prefix)).map(|p| self.person_row(p)).collect(),
        )];
        if self.theme == Theme::Cyberpunk {
          out.push(archives_variant());
        }
        out
      }
      "handle NULL values" => vec![self.variant(
        format!("Find the names of everyone in {main} with no {tag} on record."),
        base(),
        self.people.iter().filter(|p| p.4.is_none()).map(|p| row! { "name" => p.1 }).collect(),
      )],
      "ORDER BY clause" => {
        let mut sorted = self.people.to_vec();
        sorted.sort_by(|a, b| b.3.cmp(&a.3));
        vec![self.variant(
          format!("List names and {score} in {main}, richest first."),
          base(),
          sorted.iter().map(|p| row! { "name" => p.1, score => p.3 }).collect(),
        )]
      }
      "INSERT Statement" => {
        let mut after = self.people.to_vec();
        after.push(self.recruit);
        vec![self.variant(
          format!(
            "Add {} (id {}, {group} '{}', {score} {}, no {tag}) to {main}.",
            self.recruit.1, self.recruit.0, self.recruit.2, self.recruit.3
          ),
          base(),
          after.iter().map(|p| self.person_row(p)).collect(),
        )]
      }
      "UPDATE Statement" => {
        let target = self.people[3];
        let after: Vec<Person> = self
          .people
          .iter()
          .map(|p| if p.0 == target.0 { (p.0, p.1, p.2, p.3 * 2, p.4) } else { *p })
          .collect();
        vec![self.variant(
          format!("Double the {score} of {} in {main}.", target.1),
          base(),
          after.iter().map(|p| self.person_row(p)).collect(),
        )]
      }
      "DELETE Statement" => {
        let after: Vec<Person> = self.people.iter().filter(|p| p.3 >= self.threshold).copied().collect();
        vec![self.variant(
          format!("Remove everyone from {main} whose {score} is below {}.", self.threshold),
          base(),
          after.iter().map(|p| self.person_row(p)).collect(),
        )]
      }
      "basic GROUP BY and HAVING" => {
        let mut groups: Vec<(&str, i64)> = Vec::new();
        for p in &self.people {
          match groups.iter_mut().find(|(g, _)| *g == p.2) {
            Some((_, total)) => *total += p.3,
            None => groups.push((p.2, p.3)),
          }
        }
        let cutoff = self.threshold * 3;
        vec![self.variant(
          format!("Total the {score} per {group} and keep only groups above {cutoff}."),
          base(),
          groups
            .iter()
            .filter(|(_, total)| *total > cutoff)
            .map(|(g, total)| row! { group => *g, "total" => *total })
            .collect(),
        )]
      }
      "basic JOIN usage" => vec![self.variant(
        format!("Pair each entry of {} with the name of its owner from {main}.", self.rel),
        vec![self.main_table(&self.people), self.rel_table()],
        self
          .links
          .iter()
          .filter_map(|l| {
            self.people.iter().find(|p| p.0 == l.1).map(|p| row! { "name" => p.1, self.rel_item_col => l.2 })
          })
          .collect(),
      )],
      _ => Vec::new(),
    }
  }
}

/// The mission archive used by the cyberpunk LIKE challenge.
fn archives_variant() -> QueryVariant {
  let missions: [(i64, &str, &str); 5] = [
    (101, "Operation Neon Ghost", "Infiltrate the neon district relay"),
    (102, "Silent Circuit", "Disable the corporate alarm grid"),
    (103, "Neon Harvest", "Extract data from the neon farms"),
    (104, "Iron Veil", "Escort the courier through the wall"),
    (105, "Ghost Protocol", "Wipe every trace of the ghost crew"),
  ];
  let to_row = |m: &(i64, &str, &str)| {
    row! { "mission_id" => m.0, "mission_name" => m.1, "mission_description" => m.2 }
  };
  QueryVariant {
    brief: "Pull every mission from archives whose name mentions 'Neon'.".into(),
    input: vec![TableSnapshot { name: "archives".into(), rows: missions.iter().map(to_row).collect() }],
    expected: missions.iter().filter(|m| m.1.contains("Neon")).map(to_row).collect(),
  }
}

/// Every theme x concept combination, ready for `QueryBank::validate`.
pub fn seed_bank() -> QueryBank {
  let mut bank = QueryBank::default();
  for data in themes() {
    for concept in ALL_CONCEPTS {
      for v in data.variants_for(concept) {
        bank.insert(data.theme, concept, v);
      }
    }
  }
  bank
}

/// Column names of each table of a theme, for the schema panel.
pub fn theme_schema(theme: Theme) -> Vec<(String, Vec<String>)> {
  themes()
    .into_iter()
    .find(|d| d.theme == theme)
    .map(|d| {
      [d.main_table(&d.people), d.rel_table()]
        .into_iter()
        .map(|t| {
          let cols = t.rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default();
          (t.name, cols)
        })
        .collect()
    })
    .unwrap_or_default()
}
