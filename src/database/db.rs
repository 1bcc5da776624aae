use super::{
    db_structs::{LeaderboardRecord, RaceHistory, RaceParticipant, RaceResult, RatingRecord, RecordTarget},
    error::StoreError,
    store::LeaderboardStore
};
use crate::model::structures::{
    race_format::RaceFormat,
    scoring_mode::{QualifyingSet, ScoringMode}
};
use chrono::{DateTime, Utc};
use postgres_types::ToSql;
use std::{str::FromStr, sync::Arc};
use tokio_postgres::{Client, Error, NoTls, Row};
use tracing::{error, info};

/// Race filter shared by every qualifying query. Binds $1 through $5, see
/// [`QualifyingParams`].
const QUALIFYING_FILTER: &str = "r.finished = TRUE \
    AND r.solo = $1 \
    AND ($2::BOOLEAN IS NULL OR r.ranked = $2) \
    AND ($3::TEXT IS NULL OR r.format = $3) \
    AND ($4::TIMESTAMPTZ IS NULL OR r.datetime_finished > $4) \
    AND ($5::TIMESTAMPTZ IS NULL OR r.datetime_finished < $5)";

const RACE_COLUMNS: &str = "r.id AS race_id, r.format AS race_format, r.ranked AS race_ranked, \
    r.solo AS race_solo, r.finished AS race_finished, r.datetime_finished AS race_datetime_finished, \
    rp.user_id AS participant_id, u.username AS participant_name, rp.place AS participant_place, \
    rp.run_time AS participant_run_time";

const LEADERBOARD_COLUMNS: &str = "user_id, adjusted_average, real_average, num_races, num_forfeits, \
    forfeit_penalty, lowest_time, last_race";

/// Query parameters of a [`QualifyingSet`]
struct QualifyingParams {
    solo: bool,
    ranked: Option<bool>,
    format: Option<&'static str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>
}

impl QualifyingParams {
    fn new(set: &QualifyingSet) -> QualifyingParams {
        QualifyingParams {
            solo: set.solo,
            ranked: set.ranked,
            format: set.format.map(|f| f.into()),
            start: set.window.map(|(start, _)| start),
            end: set.window.map(|(_, end)| end)
        }
    }

    fn values(&self) -> Vec<&(dyn ToSql + Sync)> {
        let values: [&(dyn ToSql + Sync); 5] = [&self.solo, &self.ranked, &self.format, &self.start, &self.end];
        values.to_vec()
    }
}

#[derive(Clone)]
pub struct DbClient {
    client: Arc<Client>
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(client)
        })
    }

    async fn query_races(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<RaceHistory>, StoreError> {
        let rows = self.client.query(sql, params).await?;
        let mut races: Vec<RaceHistory> = Vec::new();

        // Rows arrive ordered by race, one row per participant
        for row in rows {
            let race_id = row.try_get::<_, i32>("race_id")?;
            let participant = Self::participant_from_row(&row)?;

            match races.last_mut() {
                Some(race) if race.race_id == race_id => race.participants.push(participant),
                _ => {
                    let mut race = Self::race_from_row(&row)?;
                    race.participants.push(participant);
                    races.push(race);
                }
            }
        }

        Ok(races)
    }

    fn race_from_row(row: &Row) -> Result<RaceHistory, StoreError> {
        let format = row.try_get::<_, String>("race_format")?;

        Ok(RaceHistory {
            race_id: row.try_get("race_id")?,
            format: RaceFormat::from_str(&format)
                .map_err(|_| StoreError::ConstraintViolation(format!("Unknown race format '{}'", format)))?,
            ranked: row.try_get("race_ranked")?,
            solo: row.try_get("race_solo")?,
            finished: row.try_get("race_finished")?,
            finished_at: row.try_get("race_datetime_finished")?,
            participants: Vec::new()
        })
    }

    fn participant_from_row(row: &Row) -> Result<RaceParticipant, StoreError> {
        Ok(RaceParticipant {
            participant_id: row.try_get("participant_id")?,
            name: row.try_get("participant_name")?,
            place: row.try_get("participant_place")?,
            run_time: row.try_get("participant_run_time")?
        })
    }

    fn result_from_row(row: &Row) -> Result<RaceResult, StoreError> {
        Ok(RaceResult {
            participant_id: row.try_get("user_id")?,
            race_id: row.try_get("race_id")?,
            place: row.try_get("place")?,
            run_time: row.try_get("run_time")?,
            race_finished_at: row.try_get("datetime_finished")?
        })
    }

    fn leaderboard_record_from_row(row: &Row) -> Result<LeaderboardRecord, StoreError> {
        Ok(LeaderboardRecord {
            participant_id: row.try_get("user_id")?,
            adjusted_average: row.try_get("adjusted_average")?,
            real_average: row.try_get("real_average")?,
            num_races: row.try_get("num_races")?,
            num_forfeits: row.try_get("num_forfeits")?,
            forfeit_penalty: row.try_get("forfeit_penalty")?,
            lowest_time: row.try_get("lowest_time")?,
            last_race: row.try_get("last_race")?
        })
    }

    fn rating_record_from_row(row: &Row) -> Result<RatingRecord, StoreError> {
        Ok(RatingRecord {
            rating: row.try_get("rating")?,
            mu: row.try_get("mu")?,
            sigma: row.try_get("sigma")?,
            change: row.try_get("rating_change")?,
            num_races: row.try_get("num_races")?,
            last_race: row.try_get("last_race")?
        })
    }

    // Access the underlying Client
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }
}

impl LeaderboardStore for DbClient {
    async fn participant_exists(&self, participant_id: i32) -> Result<bool, StoreError> {
        let row = self
            .client
            .query_one("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)", &[&participant_id])
            .await?;

        Ok(row.try_get(0)?)
    }

    async fn get_qualifying_result_window(
        &self,
        participant_id: i32,
        limit: usize,
        set: &QualifyingSet
    ) -> Result<Vec<RaceResult>, StoreError> {
        let sql = format!(
            "SELECT rp.user_id, rp.race_id, rp.place, rp.run_time, r.datetime_finished \
            FROM race_participants rp \
                JOIN races r ON rp.race_id = r.id \
            WHERE {} AND rp.user_id = $6 \
            ORDER BY r.datetime_finished DESC, r.id DESC \
            LIMIT $7",
            QUALIFYING_FILTER
        );

        let qualifying = QualifyingParams::new(set);
        let limit = limit as i64;
        let mut params = qualifying.values();
        params.push(&participant_id);
        params.push(&limit);

        let rows = self.client.query(sql.as_str(), &params).await?;
        rows.iter().map(Self::result_from_row).collect()
    }

    async fn get_all_qualifying_races(&self, set: &QualifyingSet) -> Result<Vec<RaceHistory>, StoreError> {
        info!("Fetching qualifying races...");
        let sql = format!(
            "SELECT {} \
            FROM races r \
                JOIN race_participants rp ON rp.race_id = r.id \
                JOIN users u ON u.id = rp.user_id \
            WHERE {} \
            ORDER BY r.datetime_finished, r.id, rp.id",
            RACE_COLUMNS, QUALIFYING_FILTER
        );

        let qualifying = QualifyingParams::new(set);
        let races = self.query_races(sql.as_str(), &qualifying.values()).await?;

        info!("Fetched {} qualifying races", races.len());
        Ok(races)
    }

    async fn get_qualifying_races_for_participant(
        &self,
        participant_id: i32,
        set: &QualifyingSet
    ) -> Result<Vec<RaceHistory>, StoreError> {
        let sql = format!(
            "SELECT {} \
            FROM races r \
                JOIN race_participants rp ON rp.race_id = r.id \
                JOIN users u ON u.id = rp.user_id \
            WHERE {} AND r.id IN (SELECT race_id FROM race_participants WHERE user_id = $6) \
            ORDER BY r.datetime_finished, r.id, rp.id",
            RACE_COLUMNS, QUALIFYING_FILTER
        );

        let qualifying = QualifyingParams::new(set);
        let mut params = qualifying.values();
        params.push(&participant_id);

        self.query_races(sql.as_str(), &params).await
    }

    async fn reset_records(
        &self,
        target: RecordTarget,
        mode: ScoringMode,
        prior: &RatingRecord
    ) -> Result<u64, StoreError> {
        let participant_id = target.participant_id();

        // A single statement so a failure leaves both tables untouched
        let row = self
            .client
            .query_one(
                "WITH targets AS ( \
                    SELECT id FROM users WHERE ($1::INTEGER IS NULL OR id = $1) \
                ), \
                leaderboard AS ( \
                    INSERT INTO solo_leaderboard (user_id, adjusted_average, real_average, num_races, \
                        num_forfeits, forfeit_penalty, lowest_time, last_race) \
                    SELECT id, 0, 0, 0, 0, 0, 0, NULL FROM targets \
                    ON CONFLICT (user_id) DO UPDATE SET \
                        adjusted_average = 0, \
                        real_average = 0, \
                        num_races = 0, \
                        num_forfeits = 0, \
                        forfeit_penalty = 0, \
                        lowest_time = 0, \
                        last_race = NULL \
                    RETURNING user_id \
                ), \
                ratings AS ( \
                    INSERT INTO rating_records (user_id, board, rating, mu, sigma, rating_change, num_races, last_race) \
                    SELECT id, $2::TEXT, $3::DOUBLE PRECISION, $4::DOUBLE PRECISION, $5::DOUBLE PRECISION, \
                        $6::DOUBLE PRECISION, $7::INTEGER, $8::TIMESTAMPTZ \
                    FROM targets \
                    ON CONFLICT (user_id, board) DO UPDATE SET \
                        rating = EXCLUDED.rating, \
                        mu = EXCLUDED.mu, \
                        sigma = EXCLUDED.sigma, \
                        rating_change = EXCLUDED.rating_change, \
                        num_races = EXCLUDED.num_races, \
                        last_race = EXCLUDED.last_race \
                    RETURNING user_id \
                ) \
                SELECT (SELECT COUNT(*) FROM leaderboard) AS leaderboard_rows, \
                    (SELECT COUNT(*) FROM ratings) AS rating_rows",
                &[
                    &participant_id,
                    &mode.board(),
                    &prior.rating,
                    &prior.mu,
                    &prior.sigma,
                    &prior.change,
                    &prior.num_races,
                    &prior.last_race
                ]
            )
            .await?;

        let rows = row.try_get::<_, i64>("leaderboard_rows")? as u64;
        match participant_id {
            Some(id) if rows == 0 => Err(StoreError::NotFound(id)),
            _ => Ok(rows)
        }
    }

    async fn write_leaderboard_record(
        &self,
        record: &LeaderboardRecord,
        set: &QualifyingSet,
        as_of: DateTime<Utc>
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO solo_leaderboard (user_id, adjusted_average, real_average, num_races, \
                num_forfeits, forfeit_penalty, lowest_time, last_race) \
            SELECT u.id, $7::BIGINT, $8::BIGINT, $9::INTEGER, $10::INTEGER, $11::BIGINT, $12::BIGINT, ( \
                SELECT MAX(r.datetime_finished) \
                FROM race_participants rp \
                    JOIN races r ON rp.race_id = r.id \
                WHERE rp.user_id = u.id \
                    AND {} \
                    AND r.datetime_finished <= $13::TIMESTAMPTZ \
            ) \
            FROM users u WHERE u.id = $6 \
            ON CONFLICT (user_id) DO UPDATE SET \
                adjusted_average = EXCLUDED.adjusted_average, \
                real_average = EXCLUDED.real_average, \
                num_races = EXCLUDED.num_races, \
                num_forfeits = EXCLUDED.num_forfeits, \
                forfeit_penalty = EXCLUDED.forfeit_penalty, \
                lowest_time = EXCLUDED.lowest_time, \
                last_race = EXCLUDED.last_race",
            QUALIFYING_FILTER
        );

        let qualifying = QualifyingParams::new(set);
        let mut params = qualifying.values();
        params.push(&record.participant_id);
        params.push(&record.adjusted_average);
        params.push(&record.real_average);
        params.push(&record.num_races);
        params.push(&record.num_forfeits);
        params.push(&record.forfeit_penalty);
        params.push(&record.lowest_time);
        params.push(&as_of);

        match self.client.execute(sql.as_str(), &params).await? {
            0 => Err(StoreError::NotFound(record.participant_id)),
            _ => Ok(())
        }
    }

    async fn get_leaderboard_record(&self, participant_id: i32) -> Result<Option<LeaderboardRecord>, StoreError> {
        let sql = format!("SELECT {} FROM solo_leaderboard WHERE user_id = $1", LEADERBOARD_COLUMNS);
        let row = self.client.query_opt(sql.as_str(), &[&participant_id]).await?;

        row.as_ref().map(Self::leaderboard_record_from_row).transpose()
    }

    async fn recompute_last_race_timestamp(&self, target: RecordTarget, set: &QualifyingSet) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE solo_leaderboard sl \
            SET last_race = ( \
                SELECT MAX(r.datetime_finished) \
                FROM race_participants rp \
                    JOIN races r ON rp.race_id = r.id \
                WHERE rp.user_id = sl.user_id \
                    AND {} \
            ) \
            WHERE ($6::INTEGER IS NULL OR sl.user_id = $6)",
            QUALIFYING_FILTER
        );

        let qualifying = QualifyingParams::new(set);
        let participant_id = target.participant_id();
        let mut params = qualifying.values();
        params.push(&participant_id);

        Ok(self.client.execute(sql.as_str(), &params).await?)
    }

    async fn reset_rating_records(
        &self,
        target: RecordTarget,
        mode: ScoringMode,
        prior: &RatingRecord
    ) -> Result<u64, StoreError> {
        let participant_id = target.participant_id();
        let rows = self
            .client
            .execute(
                "INSERT INTO rating_records (user_id, board, rating, mu, sigma, rating_change, num_races, last_race) \
                SELECT id, $1::TEXT, $2::DOUBLE PRECISION, $3::DOUBLE PRECISION, $4::DOUBLE PRECISION, \
                    $5::DOUBLE PRECISION, $6::INTEGER, $7::TIMESTAMPTZ \
                FROM users WHERE ($8::INTEGER IS NULL OR id = $8) \
                ON CONFLICT (user_id, board) DO UPDATE SET \
                    rating = EXCLUDED.rating, \
                    mu = EXCLUDED.mu, \
                    sigma = EXCLUDED.sigma, \
                    rating_change = EXCLUDED.rating_change, \
                    num_races = EXCLUDED.num_races, \
                    last_race = EXCLUDED.last_race",
                &[
                    &mode.board(),
                    &prior.rating,
                    &prior.mu,
                    &prior.sigma,
                    &prior.change,
                    &prior.num_races,
                    &prior.last_race,
                    &participant_id
                ]
            )
            .await?;

        match participant_id {
            Some(id) if rows == 0 => Err(StoreError::NotFound(id)),
            _ => Ok(rows)
        }
    }

    async fn write_rating_record(
        &self,
        participant_id: i32,
        mode: ScoringMode,
        record: &RatingRecord
    ) -> Result<(), StoreError> {
        self.client
            .execute(
                "INSERT INTO rating_records (user_id, board, rating, mu, sigma, rating_change, num_races, last_race) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                ON CONFLICT (user_id, board) DO UPDATE SET \
                    rating = EXCLUDED.rating, \
                    mu = EXCLUDED.mu, \
                    sigma = EXCLUDED.sigma, \
                    rating_change = EXCLUDED.rating_change, \
                    num_races = EXCLUDED.num_races, \
                    last_race = EXCLUDED.last_race",
                &[
                    &participant_id,
                    &mode.board(),
                    &record.rating,
                    &record.mu,
                    &record.sigma,
                    &record.change,
                    &record.num_races,
                    &record.last_race
                ]
            )
            .await?;

        Ok(())
    }

    async fn get_rating_record(&self, participant_id: i32, mode: ScoringMode) -> Result<Option<RatingRecord>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT rating, mu, sigma, rating_change, num_races, last_race \
                FROM rating_records WHERE user_id = $1 AND board = $2",
                &[&participant_id, &mode.board()]
            )
            .await?;

        row.as_ref().map(Self::rating_record_from_row).transpose()
    }
}
