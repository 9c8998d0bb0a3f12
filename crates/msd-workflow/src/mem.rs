//! In-memory [`WorkOrderStore`] backend.
//!
//! One mutex around all tables. Every trait method takes the lock once and
//! performs its whole check-then-write inside it, which gives the same
//! serialisation guarantees the Postgres adapter gets from its unique index
//! and status-guarded UPDATE: concurrent creates for one car cannot both
//! pass the active-application check, and concurrent guarded updates cannot
//! both observe the same pre-transition status.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use msd_schemas::{
    Application, Car, Client, NewApplication, NewCar, Payment, Priority, Role, Status, User,
};

use crate::error::{Entity, StoreError};
use crate::store::WorkOrderStore;

#[derive(Default)]
struct Inner {
    clients: HashMap<i64, Client>,
    cars: HashMap<i64, Car>,
    users: HashMap<i64, User>,
    applications: HashMap<i64, Application>,
    payments: HashMap<i64, Payment>,
    next_car_id: i64,
    next_app_id: i64,
}

/// Mutex-backed store for tests and embedded callers.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-write in another test thread;
        // the data is still the best snapshot we have.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WorkOrderStore for MemStore {
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        let mut g = self.lock();
        if g.clients.contains_key(&client.client_id)
            || g.clients.values().any(|c| c.phone == client.phone)
        {
            return Err(StoreError::DuplicateKey);
        }
        g.clients.insert(client.client_id, client.clone());
        Ok(())
    }

    async fn fetch_client(&self, client_id: i64) -> Result<Client, StoreError> {
        self.lock()
            .clients
            .get(&client_id)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::Client))
    }

    async fn update_client_phone(&self, client_id: i64, phone: &str) -> Result<(), StoreError> {
        let mut g = self.lock();
        if g.clients
            .values()
            .any(|c| c.client_id != client_id && c.phone == phone)
        {
            return Err(StoreError::DuplicateKey);
        }
        let client = g
            .clients
            .get_mut(&client_id)
            .ok_or(StoreError::NotFound(Entity::Client))?;
        client.phone = phone.to_string();
        Ok(())
    }

    async fn insert_car(&self, car: &NewCar) -> Result<i64, StoreError> {
        let mut g = self.lock();
        g.next_car_id += 1;
        let id = g.next_car_id;
        g.cars.insert(
            id,
            Car {
                id,
                client_id: car.client_id,
                brand: car.brand.clone(),
                model: car.model.clone(),
                number: car.number.clone(),
                year: car.year,
                deleted: false,
            },
        );
        Ok(id)
    }

    async fn fetch_car(&self, car_id: i64) -> Result<Car, StoreError> {
        self.lock()
            .cars
            .get(&car_id)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::Car))
    }

    async fn cars_of_client(&self, client_id: i64) -> Result<Vec<Car>, StoreError> {
        let g = self.lock();
        let mut cars: Vec<Car> = g
            .cars
            .values()
            .filter(|c| c.client_id == client_id && !c.deleted)
            .cloned()
            .collect();
        cars.sort_by_key(|c| c.id);
        Ok(cars)
    }

    async fn soft_delete_car(&self, car_id: i64) -> Result<(), StoreError> {
        let mut g = self.lock();
        let car = g
            .cars
            .get_mut(&car_id)
            .ok_or(StoreError::NotFound(Entity::Car))?;
        car.deleted = true;
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut g = self.lock();
        if g.users.contains_key(&user.user_id)
            || g.users.values().any(|u| u.phone == user.phone)
        {
            return Err(StoreError::DuplicateKey);
        }
        g.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn fetch_user(&self, user_id: i64) -> Result<User, StoreError> {
        self.lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::User))
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let g = self.lock();
        let mut users: Vec<User> = g.users.values().filter(|u| u.role == role).cloned().collect();
        users.sort_by_key(|u| u.user_id);
        Ok(users)
    }

    async fn insert_application(&self, app: &NewApplication) -> Result<i64, StoreError> {
        let mut g = self.lock();
        // Check-then-insert under one lock = atomic per-car guard.
        if g.applications
            .values()
            .any(|a| a.car_id == app.car_id && a.status.is_active())
        {
            return Err(StoreError::ActiveApplicationExists);
        }
        g.next_app_id += 1;
        let id = g.next_app_id;
        g.applications.insert(
            id,
            Application {
                id,
                client_id: app.client_id,
                car_id: app.car_id,
                problem: app.problem.clone(),
                conn: app.conn,
                admin_comment: None,
                diag_comment: None,
                mechanic_comment: None,
                status: Status::Waiting,
                priority: Priority::Low,
                diag_id: None,
                mechanic_id: None,
                arrival_time: None,
                created_at: app.created_at,
                updated_at: app.created_at,
                finished_at: None,
                pay_at: None,
                diag_price: None,
                mechanic_price: None,
            },
        );
        Ok(id)
    }

    async fn fetch_application(&self, app_id: i64) -> Result<Application, StoreError> {
        self.lock()
            .applications
            .get(&app_id)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::Application))
    }

    async fn update_application_guarded(
        &self,
        app: &Application,
        expected_status: Status,
    ) -> Result<(), StoreError> {
        let mut g = self.lock();
        let stored = g
            .applications
            .get_mut(&app.id)
            .ok_or(StoreError::NotFound(Entity::Application))?;
        if stored.status != expected_status {
            return Err(StoreError::Conflict);
        }
        *stored = app.clone();
        Ok(())
    }

    async fn update_arrival_time(
        &self,
        app_id: i64,
        arrival: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut g = self.lock();
        let stored = g
            .applications
            .get_mut(&app_id)
            .ok_or(StoreError::NotFound(Entity::Application))?;
        stored.arrival_time = Some(arrival);
        stored.updated_at = updated_at;
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut g = self.lock();
        if g.payments.contains_key(&payment.application_id) {
            return Err(StoreError::PaymentExists);
        }
        g.payments.insert(payment.application_id, payment.clone());
        Ok(())
    }

    async fn fetch_payment(&self, application_id: i64) -> Result<Payment, StoreError> {
        self.lock()
            .payments
            .get(&application_id)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::Payment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn new_app(car_id: i64) -> NewApplication {
        NewApplication {
            client_id: 1,
            car_id,
            problem: None,
            conn: 1,
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn insert_application_enforces_per_car_guard() {
        let store = MemStore::new();
        let id = store.insert_application(&new_app(10)).await.unwrap();
        let err = store.insert_application(&new_app(10)).await.unwrap_err();
        assert!(matches!(err, StoreError::ActiveApplicationExists));

        // Terminal status frees the car.
        let mut app = store.fetch_application(id).await.unwrap();
        app.status = Status::Rejected;
        store
            .update_application_guarded(&app, Status::Waiting)
            .await
            .unwrap();
        store.insert_application(&new_app(10)).await.unwrap();
    }

    #[tokio::test]
    async fn guarded_update_misses_on_stale_status() {
        let store = MemStore::new();
        let id = store.insert_application(&new_app(10)).await.unwrap();
        let mut app = store.fetch_application(id).await.unwrap();
        app.status = Status::CarWaiting;
        store
            .update_application_guarded(&app, Status::Waiting)
            .await
            .unwrap();

        // Second writer still holds the WAITING snapshot.
        let err = store
            .update_application_guarded(&app, Status::Waiting)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn duplicate_payment_is_refused() {
        let store = MemStore::new();
        let payment = Payment {
            application_id: 7,
            price: 190.0,
            method: msd_schemas::PayMethod::Card,
            pay_time: now(),
        };
        store.insert_payment(&payment).await.unwrap();
        let err = store.insert_payment(&payment).await.unwrap_err();
        assert!(matches!(err, StoreError::PaymentExists));
        // Original row unchanged.
        let stored = store.fetch_payment(7).await.unwrap();
        assert_eq!(stored.price, 190.0);
    }

    #[tokio::test]
    async fn soft_deleted_car_stays_fetchable() {
        let store = MemStore::new();
        let id = store
            .insert_car(&NewCar {
                client_id: 1,
                brand: "VAZ".into(),
                model: "2107".into(),
                number: "A123BC".into(),
                year: 2004,
            })
            .await
            .unwrap();
        store.soft_delete_car(id).await.unwrap();
        let car = store.fetch_car(id).await.unwrap();
        assert!(car.deleted);
        // But hidden from the client's listing.
        assert!(store.cars_of_client(1).await.unwrap().is_empty());
    }
}
