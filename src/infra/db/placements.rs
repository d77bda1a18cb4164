use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{PlacementsRepo, RepoError},
    domain::canvas::{ContributorId, Coordinate, Placement},
    domain::palette::Color,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PlacementRow {
    id: Uuid,
    x: i32,
    y: i32,
    color: String,
    contributor: String,
    placed_at: OffsetDateTime,
}

impl TryFrom<PlacementRow> for Placement {
    type Error = RepoError;

    fn try_from(row: PlacementRow) -> Result<Self, Self::Error> {
        let color = Color::from_hex(&row.color)
            .map_err(|err| RepoError::integrity(format!("placement {}: {err}", row.id)))?;
        let contributor = ContributorId::parse(row.contributor)
            .map_err(|err| RepoError::integrity(format!("placement {}: {err}", row.id)))?;
        Ok(Self {
            id: row.id,
            coordinate: Coordinate::new(row.x, row.y),
            color,
            contributor,
            placed_at: row.placed_at,
        })
    }
}

fn into_placements(rows: Vec<PlacementRow>) -> Result<Vec<Placement>, RepoError> {
    rows.into_iter().map(Placement::try_from).collect()
}

#[async_trait]
impl PlacementsRepo for PostgresRepositories {
    async fn append(&self, placement: &Placement) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO placements (id, x, y, color, contributor, placed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(placement.id)
        .bind(placement.coordinate.x)
        .bind(placement.coordinate.y)
        .bind(placement.color.hex())
        .bind(placement.contributor.as_str())
        .bind(placement.placed_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn latest_per_cell(&self) -> Result<Vec<Placement>, RepoError> {
        let rows = sqlx::query_as::<_, PlacementRow>(
            r#"
            SELECT DISTINCT ON (x, y) id, x, y, color, contributor, placed_at
            FROM placements
            ORDER BY x, y, placed_at DESC, seq DESC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_placements(rows)
    }

    async fn latest_at(&self, coordinate: Coordinate) -> Result<Option<Placement>, RepoError> {
        let row = sqlx::query_as::<_, PlacementRow>(
            r#"
            SELECT id, x, y, color, contributor, placed_at
            FROM placements
            WHERE x = $1 AND y = $2
            ORDER BY placed_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(coordinate.x)
        .bind(coordinate.y)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(Placement::try_from).transpose()
    }

    async fn history(
        &self,
        coordinate: Coordinate,
        limit: u32,
    ) -> Result<Vec<Placement>, RepoError> {
        let rows = sqlx::query_as::<_, PlacementRow>(
            r#"
            SELECT id, x, y, color, contributor, placed_at
            FROM placements
            WHERE x = $1 AND y = $2
            ORDER BY placed_at DESC, seq DESC
            LIMIT $3
            "#,
        )
        .bind(coordinate.x)
        .bind(coordinate.y)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_placements(rows)
    }
}
