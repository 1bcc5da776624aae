use lazy_static::lazy_static;
use std::sync::Arc;
use testcontainers::{clients::Cli, Container};
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::{Client, NoTls};

pub struct TestDatabase {
    pub connection_string: String,
    _container: Container<'static, Postgres>
}

impl TestDatabase {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        lazy_static! {
            static ref DOCKER: Arc<Cli> = Arc::new(Cli::default());
        }

        let container = DOCKER.run(Postgres::default());
        let port = container.get_host_port_ipv4(5432);

        let connection_string = format!(
            "host=localhost port={} user=postgres password=postgres dbname=postgres",
            port
        );

        let database = TestDatabase {
            connection_string,
            _container: container
        };

        let client = database.get_client().await?;
        client.batch_execute(include_str!("schema.sql")).await?;

        Ok(database)
    }

    pub async fn get_client(&self) -> Result<Client, Box<dyn std::error::Error>> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("Database connection error: {}", e);
            }
        });

        Ok(client)
    }

    /// Users 1-3. User 1 has three ranked solo finishes in season 3, user 2
    /// two finishes and two forfeits, user 3 only races outside the
    /// qualifying set.
    pub async fn seed_test_data(&self) -> Result<(), Box<dyn std::error::Error>> {
        let client = self.get_client().await?;

        client
            .execute(
                "INSERT INTO users (id, username) VALUES (1, 'Racer1'), (2, 'Racer2'), (3, 'Racer3')",
                &[]
            )
            .await?;

        client
            .batch_execute(
                "INSERT INTO races (id, format, ranked, solo, finished, datetime_finished) VALUES
                 (1, 'unseeded', TRUE, TRUE, TRUE, '2024-01-01 12:00:00+00'),
                 (2, 'unseeded', TRUE, TRUE, TRUE, '2024-01-02 12:00:00+00'),
                 (3, 'unseeded', TRUE, TRUE, TRUE, '2024-01-03 12:00:00+00'),
                 (4, 'seeded',   TRUE, TRUE, TRUE, '2024-01-04 12:00:00+00'),
                 (5, 'unseeded', TRUE, TRUE, TRUE, '2024-01-05 12:00:00+00'),
                 (6, 'unseeded', TRUE, TRUE, TRUE, '2024-01-06 12:00:00+00'),
                 (7, 'unseeded', TRUE, TRUE, TRUE, '2024-01-07 12:00:00+00'),
                 (8, 'unseeded', FALSE, TRUE, TRUE, '2024-01-08 12:00:00+00'),
                 (9, 'unseeded', TRUE, TRUE, TRUE, '2020-01-01 12:00:00+00'),
                 (10, 'unseeded', TRUE, TRUE, FALSE, '2024-01-10 12:00:00+00');

                 INSERT INTO race_participants (race_id, user_id, place, run_time) VALUES
                 (1, 1, 1, 600000),
                 (2, 1, 1, 700000),
                 (3, 1, 1, 800000),
                 (4, 2, 1, 600000),
                 (5, 2, 0, 0),
                 (6, 2, 1, 900000),
                 (7, 2, 0, 0),
                 (8, 3, 1, 400000),
                 (9, 3, 1, 400000),
                 (10, 3, 1, 400000);"
            )
            .await?;

        Ok(())
    }
}
