use sqlx::PgPool;

use super::services::NamedRef;

pub struct ReferenceNames {
    pub categories: Vec<NamedRef>,
    pub publishers: Vec<NamedRef>,
    pub authors: Vec<NamedRef>,
}

pub async fn reference_names(db: &PgPool) -> Result<ReferenceNames, sqlx::Error> {
    let categories = sqlx::query_as::<_, NamedRef>(
        "SELECT id, category_name AS name FROM category ORDER BY category_name",
    )
    .fetch_all(db)
    .await?;
    let publishers = sqlx::query_as::<_, NamedRef>(
        "SELECT id, publisher_name AS name FROM publisher ORDER BY publisher_name",
    )
    .fetch_all(db)
    .await?;
    let authors = sqlx::query_as::<_, NamedRef>(
        "SELECT id, first_name || ' ' || last_name AS name FROM author ORDER BY last_name, first_name",
    )
    .fetch_all(db)
    .await?;
    Ok(ReferenceNames {
        categories,
        publishers,
        authors,
    })
}
