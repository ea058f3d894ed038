use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::dto::AuthorLink;
use super::repo_types::{Author, Book, BookAuthorRef, BookSummary, Category, Publisher};
use super::services::{ValidAuthor, ValidBook, ValidCategory, ValidPublisher};
use crate::db::Removal;
use crate::lending::rules::Availability;

const BOOK_COLUMNS: &str = "b.id, b.isbn, b.title, b.subtitle, b.description, b.publication_date, \
                            b.edition, b.pages, b.language, b.publisher_id, b.category_id, \
                            b.total_copies, b.quantity, b.cover_image_url, b.availability, \
                            b.created_at, b.updated_at";

const RETURNING_BOOK: &str = "RETURNING id, isbn, title, subtitle, description, publication_date, \
                              edition, pages, language, publisher_id, category_id, total_copies, \
                              quantity, cover_image_url, availability, created_at, updated_at";

pub struct BookFilter {
    pub pattern: Option<String>,
    pub category_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    pub available_only: bool,
}

fn availability_of(quantity: i32) -> Availability {
    if quantity > 0 {
        Availability::Available
    } else {
        Availability::Borrowed
    }
}

// ---- books ----

pub async fn list_books(
    db: &PgPool,
    f: &BookFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<BookSummary>, i64), sqlx::Error> {
    const WHERE: &str = r#"
         WHERE ($1::text IS NULL OR b.title ILIKE $1 OR b.subtitle ILIKE $1 OR b.isbn ILIKE $1)
           AND ($2::uuid IS NULL OR b.category_id = $2)
           AND ($3::uuid IS NULL OR b.publisher_id = $3)
           AND (NOT $4 OR b.quantity > 0)
    "#;

    let rows = sqlx::query_as::<_, BookSummary>(&format!(
        r#"
        SELECT {BOOK_COLUMNS}, c.category_name, p.publisher_name
          FROM book b
          JOIN category c ON c.id = b.category_id
          JOIN publisher p ON p.id = b.publisher_id
        {WHERE}
         ORDER BY b.title ASC, b.id
         LIMIT $5 OFFSET $6
        "#
    ))
    .bind(&f.pattern)
    .bind(f.category_id)
    .bind(f.publisher_id)
    .bind(f.available_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM book b {WHERE}"))
        .bind(&f.pattern)
        .bind(f.category_id)
        .bind(f.publisher_id)
        .bind(f.available_only)
        .fetch_one(db)
        .await?;

    Ok((rows, total))
}

pub async fn get_book(db: &PgPool, id: Uuid) -> Result<Option<BookSummary>, sqlx::Error> {
    sqlx::query_as::<_, BookSummary>(&format!(
        r#"
        SELECT {BOOK_COLUMNS}, c.category_name, p.publisher_name
          FROM book b
          JOIN category c ON c.id = b.category_id
          JOIN publisher p ON p.id = b.publisher_id
         WHERE b.id = $1
        "#
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn book_authors(db: &PgPool, book_id: Uuid) -> Result<Vec<BookAuthorRef>, sqlx::Error> {
    sqlx::query_as::<_, BookAuthorRef>(
        r#"
        SELECT a.id AS author_id, a.first_name || ' ' || a.last_name AS full_name, ba.author_role
          FROM book_author ba
          JOIN author a ON a.id = ba.author_id
         WHERE ba.book_id = $1
         ORDER BY ba.author_role = 'primary' DESC, a.last_name, a.first_name
        "#,
    )
    .bind(book_id)
    .fetch_all(db)
    .await
}

/// Current `(quantity, total_copies)` under a row lock.
pub async fn lock_pool(conn: &mut PgConnection, id: Uuid) -> Result<Option<(i32, i32)>, sqlx::Error> {
    sqlx::query_as::<_, (i32, i32)>("SELECT quantity, total_copies FROM book WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn insert_book(
    conn: &mut PgConnection,
    b: &ValidBook,
    quantity: i32,
) -> Result<Book, sqlx::Error> {
    sqlx::query_as::<_, Book>(&format!(
        r#"
        INSERT INTO book (isbn, title, subtitle, description, publication_date, edition, pages,
                          language, publisher_id, category_id, total_copies, quantity,
                          cover_image_url, availability)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        {RETURNING_BOOK}
        "#
    ))
    .bind(&b.isbn)
    .bind(&b.title)
    .bind(&b.subtitle)
    .bind(&b.description)
    .bind(b.publication_date)
    .bind(&b.edition)
    .bind(b.pages)
    .bind(&b.language)
    .bind(b.publisher_id)
    .bind(b.category_id)
    .bind(b.total_copies)
    .bind(quantity)
    .bind(&b.cover_image_url)
    .bind(availability_of(quantity))
    .fetch_one(conn)
    .await
}

pub async fn update_book(
    conn: &mut PgConnection,
    id: Uuid,
    b: &ValidBook,
    quantity: i32,
) -> Result<Book, sqlx::Error> {
    sqlx::query_as::<_, Book>(&format!(
        r#"
        UPDATE book
           SET isbn = $2, title = $3, subtitle = $4, description = $5, publication_date = $6,
               edition = $7, pages = $8, language = $9, publisher_id = $10, category_id = $11,
               total_copies = $12, quantity = $13, cover_image_url = $14, availability = $15,
               updated_at = now()
         WHERE id = $1
        {RETURNING_BOOK}
        "#
    ))
    .bind(id)
    .bind(&b.isbn)
    .bind(&b.title)
    .bind(&b.subtitle)
    .bind(&b.description)
    .bind(b.publication_date)
    .bind(&b.edition)
    .bind(b.pages)
    .bind(&b.language)
    .bind(b.publisher_id)
    .bind(b.category_id)
    .bind(b.total_copies)
    .bind(quantity)
    .bind(&b.cover_image_url)
    .bind(availability_of(quantity))
    .fetch_one(conn)
    .await
}

pub async fn replace_authors(
    conn: &mut PgConnection,
    book_id: Uuid,
    links: &[AuthorLink],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM book_author WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
    for link in links {
        sqlx::query("INSERT INTO book_author (book_id, author_id, author_role) VALUES ($1, $2, $3)")
            .bind(book_id)
            .bind(link.author_id)
            .bind(link.role)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Ids from `ids` that have no author row.
pub async fn missing_authors(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Uuid>, sqlx::Error> {
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM author WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(conn)
        .await?;
    Ok(ids.iter().filter(|id| !found.contains(id)).copied().collect())
}

pub async fn reference_exists(
    conn: &mut PgConnection,
    table: RefTable,
    id: Uuid,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
        table.name()
    ))
    .bind(id)
    .fetch_one(conn)
    .await
}

#[derive(Debug, Clone, Copy)]
pub enum RefTable {
    Category,
    Publisher,
}

impl RefTable {
    fn name(self) -> &'static str {
        match self {
            RefTable::Category => "category",
            RefTable::Publisher => "publisher",
        }
    }
}

/// Deletes a book unless copies are on loan. The book row stays locked until the
/// caller's transaction ends, so a concurrent borrow cannot slip in between.
pub async fn delete_book(conn: &mut PgConnection, id: Uuid) -> Result<Removal, sqlx::Error> {
    if lock_pool(&mut *conn, id).await?.is_none() {
        return Ok(Removal::Missing);
    }
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM borrow_record WHERE book_id = $1 AND NOT is_returned",
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    if active > 0 {
        return Ok(Removal::InUse(active));
    }
    sqlx::query("DELETE FROM book WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(Removal::Removed)
}

// ---- authors ----

const AUTHOR_COLUMNS: &str = "id, first_name, last_name, biography, nationality, created_at, updated_at";

pub async fn list_authors(db: &PgPool, pattern: Option<&str>) -> Result<Vec<Author>, sqlx::Error> {
    sqlx::query_as::<_, Author>(&format!(
        r#"
        SELECT {AUTHOR_COLUMNS} FROM author
         WHERE ($1::text IS NULL OR first_name ILIKE $1 OR last_name ILIKE $1
                OR (first_name || ' ' || last_name) ILIKE $1)
         ORDER BY last_name, first_name
        "#
    ))
    .bind(pattern)
    .fetch_all(db)
    .await
}

pub async fn get_author(db: &PgPool, id: Uuid) -> Result<Option<Author>, sqlx::Error> {
    sqlx::query_as::<_, Author>(&format!("SELECT {AUTHOR_COLUMNS} FROM author WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn create_author(db: &PgPool, a: &ValidAuthor) -> Result<Author, sqlx::Error> {
    sqlx::query_as::<_, Author>(&format!(
        r#"
        INSERT INTO author (first_name, last_name, biography, nationality)
        VALUES ($1, $2, $3, $4)
        RETURNING {AUTHOR_COLUMNS}
        "#
    ))
    .bind(&a.first_name)
    .bind(&a.last_name)
    .bind(&a.biography)
    .bind(&a.nationality)
    .fetch_one(db)
    .await
}

pub async fn update_author(db: &PgPool, id: Uuid, a: &ValidAuthor) -> Result<Option<Author>, sqlx::Error> {
    sqlx::query_as::<_, Author>(&format!(
        r#"
        UPDATE author
           SET first_name = $2, last_name = $3, biography = $4, nationality = $5, updated_at = now()
         WHERE id = $1
        RETURNING {AUTHOR_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&a.first_name)
    .bind(&a.last_name)
    .bind(&a.biography)
    .bind(&a.nationality)
    .fetch_optional(db)
    .await
}

pub async fn delete_author(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM author WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn author_book_count(db: &PgPool, id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM book_author WHERE author_id = $1")
        .bind(id)
        .fetch_one(db)
        .await
}

// ---- publishers ----

const PUBLISHER_COLUMNS: &str =
    "id, publisher_name, address, phone, email, website, established_year, created_at, updated_at";

pub async fn list_publishers(db: &PgPool, pattern: Option<&str>) -> Result<Vec<Publisher>, sqlx::Error> {
    sqlx::query_as::<_, Publisher>(&format!(
        r#"
        SELECT {PUBLISHER_COLUMNS} FROM publisher
         WHERE ($1::text IS NULL OR publisher_name ILIKE $1)
         ORDER BY publisher_name
        "#
    ))
    .bind(pattern)
    .fetch_all(db)
    .await
}

pub async fn get_publisher(db: &PgPool, id: Uuid) -> Result<Option<Publisher>, sqlx::Error> {
    sqlx::query_as::<_, Publisher>(&format!(
        "SELECT {PUBLISHER_COLUMNS} FROM publisher WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn create_publisher(db: &PgPool, p: &ValidPublisher) -> Result<Publisher, sqlx::Error> {
    sqlx::query_as::<_, Publisher>(&format!(
        r#"
        INSERT INTO publisher (publisher_name, address, phone, email, website, established_year)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {PUBLISHER_COLUMNS}
        "#
    ))
    .bind(&p.publisher_name)
    .bind(&p.address)
    .bind(&p.phone)
    .bind(&p.email)
    .bind(&p.website)
    .bind(p.established_year)
    .fetch_one(db)
    .await
}

pub async fn update_publisher(
    db: &PgPool,
    id: Uuid,
    p: &ValidPublisher,
) -> Result<Option<Publisher>, sqlx::Error> {
    sqlx::query_as::<_, Publisher>(&format!(
        r#"
        UPDATE publisher
           SET publisher_name = $2, address = $3, phone = $4, email = $5, website = $6,
               established_year = $7, updated_at = now()
         WHERE id = $1
        RETURNING {PUBLISHER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&p.publisher_name)
    .bind(&p.address)
    .bind(&p.phone)
    .bind(&p.email)
    .bind(&p.website)
    .bind(p.established_year)
    .fetch_optional(db)
    .await
}

pub async fn delete_publisher(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM publisher WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}

// ---- categories ----

const CATEGORY_COLUMNS: &str =
    "id, category_name, description, parent_category_id, created_at, updated_at";

pub async fn list_categories(db: &PgPool, pattern: Option<&str>) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(&format!(
        r#"
        SELECT {CATEGORY_COLUMNS} FROM category
         WHERE ($1::text IS NULL OR category_name ILIKE $1)
         ORDER BY category_name
        "#
    ))
    .bind(pattern)
    .fetch_all(db)
    .await
}

/// Every category as `id -> (name, parent)`.
pub async fn category_tree(db: &PgPool) -> Result<HashMap<Uuid, (String, Option<Uuid>)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, String, Option<Uuid>)>(
        "SELECT id, category_name, parent_category_id FROM category",
    )
    .fetch_all(db)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name, parent)| (id, (name, parent)))
        .collect())
}

pub async fn get_category(db: &PgPool, id: Uuid) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM category WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn create_category(db: &PgPool, c: &ValidCategory) -> Result<Category, sqlx::Error> {
    sqlx::query_as::<_, Category>(&format!(
        r#"
        INSERT INTO category (category_name, description, parent_category_id)
        VALUES ($1, $2, $3)
        RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(&c.category_name)
    .bind(&c.description)
    .bind(c.parent_category_id)
    .fetch_one(db)
    .await
}

pub async fn update_category(
    db: &PgPool,
    id: Uuid,
    c: &ValidCategory,
) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(&format!(
        r#"
        UPDATE category
           SET category_name = $2, description = $3, parent_category_id = $4, updated_at = now()
         WHERE id = $1
        RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&c.category_name)
    .bind(&c.description)
    .bind(c.parent_category_id)
    .fetch_optional(db)
    .await
}

pub async fn delete_category(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM category WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}
