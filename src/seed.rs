use canteen::{
    db::{
        init_db,
        models::{Day, MealSlot, Role, User},
    },
    services::auth,
};
use chrono::Utc;
use sqlx::SqlitePool;

struct SeedItem {
    name: &'static str,
    price: f64,
    category: &'static str,
    description: &'static str,
    day: Day,
    meal_slot: MealSlot,
}

fn get_seed_menu() -> Vec<SeedItem> {
    vec![
        SeedItem {
            name: "Masala Dosa",
            price: 45.0,
            category: "breakfast",
            description: "Crisp dosa with potato filling and chutney",
            day: Day::Monday,
            meal_slot: MealSlot::Breakfast,
        },
        SeedItem {
            name: "Idli Sambar",
            price: 30.0,
            category: "breakfast",
            description: "Three idlis with sambar",
            day: Day::Tuesday,
            meal_slot: MealSlot::Breakfast,
        },
        SeedItem {
            name: "Poha",
            price: 25.0,
            category: "breakfast",
            description: "Flattened rice with peanuts",
            day: Day::Wednesday,
            meal_slot: MealSlot::Breakfast,
        },
        SeedItem {
            name: "Veg Thali",
            price: 90.0,
            category: "lunch",
            description: "Rice, two sabzis, dal, roti and curd",
            day: Day::Monday,
            meal_slot: MealSlot::Lunch,
        },
        SeedItem {
            name: "Rajma Chawal",
            price: 70.0,
            category: "lunch",
            description: "Kidney bean curry with steamed rice",
            day: Day::Thursday,
            meal_slot: MealSlot::Lunch,
        },
        SeedItem {
            name: "Veg Biryani",
            price: 85.0,
            category: "lunch",
            description: "Basmati rice with vegetables and raita",
            day: Day::Friday,
            meal_slot: MealSlot::Lunch,
        },
        SeedItem {
            name: "Samosa",
            price: 15.0,
            category: "snacks",
            description: "Two samosas with green chutney",
            day: Day::Monday,
            meal_slot: MealSlot::Snacks,
        },
        SeedItem {
            name: "Masala Tea",
            price: 10.0,
            category: "snacks",
            description: "Ginger and cardamom tea",
            day: Day::Saturday,
            meal_slot: MealSlot::Snacks,
        },
    ]
}

async fn seed_menu(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM menu_items")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        log::info!("Menu already has {} items, skipping", existing);
        return Ok(0);
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for item in get_seed_menu() {
        sqlx::query(
            "INSERT INTO menu_items \
             (name, price, category, description, image, day, meal_slot, is_available, created_at, updated_at) \
             VALUES (?, ?, ?, ?, NULL, ?, ?, 1, ?, ?)",
        )
        .bind(item.name)
        .bind(item.price)
        .bind(item.category)
        .bind(item.description)
        .bind(item.day)
        .bind(item.meal_slot)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        inserted += 1;
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Creates a staff account unless one exists for `email`.
///
/// Without a password nothing is created; there is no fallback password.
async fn seed_account(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password: Option<String>,
    role: Role,
) -> Option<User> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        log::warn!("No password configured for {} account {}, skipping", role, email);
        return None;
    };

    match auth::find_user_by_email(pool, email).await {
        Ok(Some(user)) => {
            log::info!("{} account {} already exists", role, email);
            Some(user)
        }
        Ok(None) => match auth::create_user(pool, name, email, &password, role).await {
            Ok(user) => {
                log::info!("Created {} account {}", user.role, user.email);
                Some(user)
            }
            Err(e) => {
                log::error!("Failed to create {} account: {}", role, e);
                None
            }
        },
        Err(e) => {
            log::error!("Failed to look up {}: {}", email, e);
            None
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://canteen.db".to_string());
    let pool = init_db(&database_url).await?;

    let inserted = seed_menu(&pool).await?;
    log::info!("Seeded {} menu items", inserted);

    seed_account(
        &pool,
        "Admin",
        &env_or("SEED_ADMIN_EMAIL", "admin@canteen.local"),
        std::env::var("SEED_ADMIN_PASSWORD").ok(),
        Role::Admin,
    )
    .await;
    seed_account(
        &pool,
        "Counter",
        &env_or("SEED_COUNTER_EMAIL", "counter@canteen.local"),
        std::env::var("SEED_COUNTER_PASSWORD").ok(),
        Role::Counter,
    )
    .await;

    Ok(())
}
