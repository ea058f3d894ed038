//! Input cleaning and validation for catalog writes, plus the category tree helpers.

use std::collections::{HashMap, HashSet};

use time::Date;
use uuid::Uuid;

use super::dto::{AuthorInput, AuthorLink, BookInput, CategoryInput, PublisherInput};
use crate::auth::services::is_valid_email;
use crate::isbn::services::normalize_isbn;

/// Collapses internal whitespace runs and trims.
pub fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn optional_line(value: Option<&str>) -> Option<String> {
    value.map(single_line).filter(|v| !v.is_empty())
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{field} must be at most {max} characters"));
    }
    Ok(())
}

/// `ILIKE` pattern matching `q` anywhere, with wildcards in `q` escaped.
pub fn like_pattern(q: &str) -> String {
    let escaped = q
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub fn search_term(q: Option<&str>) -> Option<String> {
    q.map(str::trim).filter(|q| !q.is_empty()).map(like_pattern)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBook {
    pub title: String,
    pub subtitle: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<Date>,
    pub edition: Option<String>,
    pub pages: Option<i32>,
    pub language: String,
    pub cover_image_url: Option<String>,
    pub category_id: Uuid,
    pub publisher_id: Uuid,
    pub total_copies: i32,
    pub quantity: Option<i32>,
    pub authors: Option<Vec<AuthorLink>>,
}

/// Cleans a book body. `creating` additionally requires at least one author.
pub fn validate_book(input: BookInput, creating: bool) -> Result<ValidBook, String> {
    let title = single_line(&input.title);
    if title.is_empty() {
        return Err("Title is required".into());
    }
    check_len("Title", &title, 255)?;

    let subtitle = optional_line(input.subtitle.as_deref());
    if let Some(s) = &subtitle {
        check_len("Subtitle", s, 255)?;
    }
    let edition = optional_line(input.edition.as_deref());
    if let Some(e) = &edition {
        check_len("Edition", e, 50)?;
    }
    let language = optional_line(input.language.as_deref()).unwrap_or_else(|| "English".into());
    check_len("Language", &language, 50)?;
    let cover_image_url = optional_line(input.cover_image_url.as_deref());
    if let Some(u) = &cover_image_url {
        check_len("Cover image URL", u, 500)?;
    }

    let isbn = match optional_line(input.isbn.as_deref()) {
        Some(raw) => Some(normalize_isbn(&raw).map_err(|e| e.to_string())?),
        None => None,
    };

    let category_id = input.category_id.ok_or("Category is required")?;
    let publisher_id = input.publisher_id.ok_or("Publisher is required")?;

    if input.pages.is_some_and(|p| p <= 0) {
        return Err("Pages must be a positive number".into());
    }

    let total_copies = input.total_copies.unwrap_or(1);
    if total_copies < 1 {
        return Err("Total copies must be at least 1".into());
    }
    if let Some(q) = input.quantity {
        if q < 0 || q > total_copies {
            return Err("Quantity must be between 0 and total copies".into());
        }
    }

    let authors = match input.authors {
        Some(links) if links.is_empty() => return Err("At least one author is required".into()),
        Some(links) => {
            let mut seen = HashSet::new();
            if !links.iter().all(|l| seen.insert(l.author_id)) {
                return Err("An author may only be linked once".into());
            }
            Some(links)
        }
        None if creating => return Err("At least one author is required".into()),
        None => None,
    };

    Ok(ValidBook {
        title,
        subtitle,
        isbn,
        description: optional_text(input.description.as_deref()),
        publication_date: input.publication_date,
        edition,
        pages: input.pages,
        language,
        cover_image_url,
        category_id,
        publisher_id,
        total_copies,
        quantity: input.quantity,
        authors,
    })
}

/// New on-shelf quantity after resizing a book from `old_total` to `new_total`.
/// Without an explicit quantity the number of copies on loan is preserved.
pub fn resize_pool(
    old_quantity: i32,
    old_total: i32,
    new_total: i32,
    explicit: Option<i32>,
) -> Result<i32, String> {
    let on_loan = (old_total - old_quantity).max(0);
    match explicit {
        Some(q) => Ok(q),
        None if new_total < on_loan => Err(format!(
            "Total copies cannot be lower than the {on_loan} copies currently on loan"
        )),
        None => Ok(new_total - on_loan),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidAuthor {
    pub first_name: String,
    pub last_name: String,
    pub biography: Option<String>,
    pub nationality: Option<String>,
}

pub fn validate_author(input: AuthorInput) -> Result<ValidAuthor, String> {
    let first_name = single_line(&input.first_name);
    let last_name = single_line(&input.last_name);
    if first_name.is_empty() || last_name.is_empty() {
        return Err("First and last name are required".into());
    }
    check_len("First name", &first_name, 50)?;
    check_len("Last name", &last_name, 50)?;
    let nationality = optional_line(input.nationality.as_deref());
    if let Some(n) = &nationality {
        check_len("Nationality", n, 50)?;
    }
    Ok(ValidAuthor {
        first_name,
        last_name,
        biography: optional_text(input.biography.as_deref()),
        nationality,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPublisher {
    pub publisher_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub established_year: Option<i32>,
}

pub fn validate_publisher(input: PublisherInput) -> Result<ValidPublisher, String> {
    let publisher_name = single_line(&input.publisher_name);
    if publisher_name.is_empty() {
        return Err("Publisher name is required".into());
    }
    check_len("Publisher name", &publisher_name, 100)?;

    let email = optional_line(input.email.as_deref()).map(|e| e.to_lowercase());
    if let Some(e) = &email {
        if !is_valid_email(e) {
            return Err("Invalid email".into());
        }
    }
    let phone = optional_line(input.phone.as_deref());
    if let Some(p) = &phone {
        check_len("Phone", p, 15)?;
    }
    let website = optional_line(input.website.as_deref());
    if let Some(w) = &website {
        check_len("Website", w, 255)?;
    }
    if input
        .established_year
        .is_some_and(|y| !(1000..=9999).contains(&y))
    {
        return Err("Established year must be a four-digit year".into());
    }

    Ok(ValidPublisher {
        publisher_name,
        address: optional_text(input.address.as_deref()),
        phone,
        email,
        website,
        established_year: input.established_year,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCategory {
    pub category_name: String,
    pub description: Option<String>,
    pub parent_category_id: Option<Uuid>,
}

pub fn validate_category(input: CategoryInput) -> Result<ValidCategory, String> {
    let category_name = single_line(&input.category_name);
    if category_name.is_empty() {
        return Err("Category name is required".into());
    }
    check_len("Category name", &category_name, 100)?;
    Ok(ValidCategory {
        category_name,
        description: optional_text(input.description.as_deref()),
        parent_category_id: input.parent_category_id,
    })
}

/// True when making `new_parent` the parent of `category` would put
/// `category` among its own ancestors.
pub fn creates_cycle(
    category: Uuid,
    new_parent: Uuid,
    parent_of: &HashMap<Uuid, Option<Uuid>>,
) -> bool {
    let mut seen = HashSet::new();
    let mut current = Some(new_parent);
    while let Some(id) = current {
        if id == category || !seen.insert(id) {
            return true;
        }
        current = parent_of.get(&id).copied().flatten();
    }
    false
}

/// `Root > ... > Name` for `id`; stops at a missing or repeated ancestor.
pub fn full_path(id: Uuid, nodes: &HashMap<Uuid, (String, Option<Uuid>)>) -> String {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(id);
    while let Some(cid) = current {
        if !seen.insert(cid) {
            break;
        }
        match nodes.get(&cid) {
            Some((name, parent)) => {
                names.push(name.as_str());
                current = *parent;
            }
            None => break,
        }
    }
    names.reverse();
    names.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::repo_types::AuthorRole;

    fn book_input() -> BookInput {
        BookInput {
            title: "  The   Left Hand of Darkness ".into(),
            isbn: Some("978-0-441-47812-5".into()),
            category_id: Some(Uuid::new_v4()),
            publisher_id: Some(Uuid::new_v4()),
            total_copies: Some(3),
            authors: Some(vec![AuthorLink {
                author_id: Uuid::new_v4(),
                role: AuthorRole::Primary,
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn book_fields_are_cleaned() {
        let b = validate_book(book_input(), true).unwrap();
        assert_eq!(b.title, "The Left Hand of Darkness");
        assert_eq!(b.isbn.as_deref(), Some("9780441478125"));
        assert_eq!(b.language, "English");
        assert_eq!(b.total_copies, 3);
        assert_eq!(b.quantity, None);
    }

    #[test]
    fn same_input_validates_to_equal_books() {
        let input = book_input();
        let a = validate_book(input.clone(), true).unwrap();
        let b = validate_book(input, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.authors.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn single_line_collapses_whitespace() {
        assert_eq!(single_line("  Mary \n Ann  "), "Mary Ann");
        assert_eq!(single_line(" \t "), "");
    }

    #[test]
    fn book_requires_title_category_publisher_and_author() {
        let mut no_title = book_input();
        no_title.title = "   ".into();
        assert!(validate_book(no_title, true).is_err());

        let mut no_category = book_input();
        no_category.category_id = None;
        assert_eq!(validate_book(no_category, true).unwrap_err(), "Category is required");

        let mut no_authors = book_input();
        no_authors.authors = None;
        assert!(validate_book(no_authors.clone(), true).is_err());
        assert!(validate_book(no_authors, false).is_ok());
    }

    #[test]
    fn book_rejects_bad_isbn_and_pool() {
        let mut bad_isbn = book_input();
        bad_isbn.isbn = Some("12-34".into());
        assert!(validate_book(bad_isbn, true).unwrap_err().contains("ISBN"));

        let mut too_many = book_input();
        too_many.quantity = Some(4);
        assert!(validate_book(too_many, true).is_err());

        let mut zero_copies = book_input();
        zero_copies.total_copies = Some(0);
        assert!(validate_book(zero_copies, true).is_err());
    }

    #[test]
    fn duplicate_author_links_are_rejected() {
        let id = Uuid::new_v4();
        let mut input = book_input();
        input.authors = Some(vec![
            AuthorLink { author_id: id, role: AuthorRole::Primary },
            AuthorLink { author_id: id, role: AuthorRole::Editor },
        ]);
        assert!(validate_book(input, true).is_err());
    }

    #[test]
    fn resize_keeps_copies_on_loan() {
        // 5 copies, 2 on shelf: 3 on loan.
        assert_eq!(resize_pool(2, 5, 8, None), Ok(5));
        assert_eq!(resize_pool(2, 5, 3, None), Ok(0));
        assert!(resize_pool(2, 5, 2, None).is_err());
        assert_eq!(resize_pool(2, 5, 2, Some(1)), Ok(1));
    }

    #[test]
    fn publisher_email_and_year_checked() {
        let ok = validate_publisher(PublisherInput {
            publisher_name: " Tor  Books ".into(),
            email: Some("Info@Tor.com".into()),
            established_year: Some(1980),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ok.publisher_name, "Tor Books");
        assert_eq!(ok.email.as_deref(), Some("info@tor.com"));

        assert!(validate_publisher(PublisherInput {
            publisher_name: "Tor".into(),
            email: Some("not-an-email".into()),
            ..Default::default()
        })
        .is_err());
        assert!(validate_publisher(PublisherInput {
            publisher_name: "Tor".into(),
            established_year: Some(20),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn author_requires_both_names() {
        assert!(validate_author(AuthorInput {
            first_name: "Ursula".into(),
            last_name: "".into(),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn cycle_detection_walks_ancestors() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        // a <- b <- c
        let parents = HashMap::from([(a, None), (b, Some(a)), (c, Some(b))]);
        assert!(creates_cycle(a, c, &parents));
        assert!(creates_cycle(a, a, &parents));
        assert!(!creates_cycle(c, a, &parents));
    }

    #[test]
    fn full_path_joins_ancestors() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let nodes = HashMap::from([
            (a, ("Fiction".to_string(), None)),
            (b, ("Science Fiction".to_string(), Some(a))),
        ]);
        assert_eq!(full_path(b, &nodes), "Fiction > Science Fiction");
        assert_eq!(full_path(a, &nodes), "Fiction");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 100%_done "), "%100\\%\\_done%");
        assert_eq!(search_term(Some("   ")), None);
    }
}
