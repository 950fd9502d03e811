//! Course selection and sign-up workflow for the logged-in user.
//!
//! [`UserCourses`] composes the user's `selections` and `signups` stores into
//! the views the frontend shows (selected, waiting, reserved, accepted) and
//! implements the workflow on top: selecting a course if it does not collide
//! with anything already chosen, turning selections into signups, freeing
//! signups and paying for reserved ones.

mod error;
mod payment;
mod types;

pub use error::SignupError;
pub use payment::{PaymentError, PaymentOptions, PaymentProvider};
pub use types::*;

use crate::config::ClientConfig;
use crate::overlap::overlaps;
use crate::session::Session;
use crate::store::{Record, ResourceStore, StoreError};
use crate::transport::{ApiRequest, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The logged-in user's courses.
pub struct UserCourses {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    course_price: u64,
    currency: String,
    selections: ResourceStore<Selection>,
    signups: ResourceStore<Signup>,
    courses: ResourceStore<Course>,
    lectures: ResourceStore<Lecture>,
}

impl UserCourses {
    /// Creates the stores for the user of `session`.
    ///
    /// Selections and signups are filtered to that user; the course catalog
    /// embeds each course's lecture.
    pub fn new(transport: Arc<dyn Transport>, session: Arc<Session>, config: &ClientConfig) -> Self {
        let nethz = session.identifier().unwrap_or_default();

        let selections: ResourceStore<Selection> = configured_store("selections", &transport, config)
            .with_query("where", json!({ "nethz": nethz }));
        let signups: ResourceStore<Signup> = configured_store("signups", &transport, config)
            .with_query("where", json!({ "nethz": nethz }));
        let courses: ResourceStore<Course> = configured_store("courses", &transport, config)
            .with_query("embedded", json!({ "lecture": 1 }));
        let lectures: ResourceStore<Lecture> = configured_store("lectures", &transport, config);

        Self {
            selections,
            signups,
            courses,
            lectures,
            course_price: config.course_price,
            currency: config.currency.clone(),
            session,
            transport,
        }
    }

    pub fn selections(&self) -> &ResourceStore<Selection> {
        &self.selections
    }

    pub fn signups(&self) -> &ResourceStore<Signup> {
        &self.signups
    }

    pub fn courses(&self) -> &ResourceStore<Course> {
        &self.courses
    }

    pub fn lectures(&self) -> &ResourceStore<Lecture> {
        &self.lectures
    }

    /// The lecture a course belongs to.
    ///
    /// Uses the embedded lecture if the course carries one, otherwise looks the
    /// id up in the loaded lecture catalog.
    pub fn lecture(&self, course: &Course) -> Option<Lecture> {
        match course.lecture.as_ref()? {
            LectureRef::Embedded(lecture) => Some((**lecture).clone()),
            LectureRef::Id(id) => self.lectures.get(id),
        }
    }

    /// Reloads the user's selections and signups.
    pub async fn refresh(&self) -> Result<(), SignupError> {
        let (selections, signups) =
            tokio::join!(self.selections.fetch_all(), self.signups.fetch_all());
        selections?;
        signups?;
        Ok(())
    }

    /// Loads all courses and lectures.
    pub async fn load_catalog(&self) -> Result<(), SignupError> {
        let (courses, lectures) =
            tokio::join!(self.courses.fetch_all(), self.lectures.fetch_all());
        courses?;
        lectures?;
        Ok(())
    }

    pub fn selected(&self) -> Vec<Selection> {
        self.selections.list()
    }

    /// Signups on the waiting list.
    pub fn waiting(&self) -> Vec<Signup> {
        self.signups_with(SignupStatus::Pending)
    }

    pub fn reserved(&self) -> Vec<Signup> {
        self.signups_with(SignupStatus::Reserved)
    }

    pub fn accepted(&self) -> Vec<Signup> {
        self.signups_with(SignupStatus::Accepted)
    }

    fn signups_with(&self, status: SignupStatus) -> Vec<Signup> {
        self.signups
            .list()
            .into_iter()
            .filter(|signup| signup.status == status)
            .collect()
    }

    /// True while an update or delete on selections or signups is in flight.
    pub fn is_busy(&self) -> bool {
        self.selections.is_busy() || self.signups.is_busy()
    }

    /// Selects a course, unless it collides with a course already chosen.
    ///
    /// The course's time slots are compared with those of every selected,
    /// waiting and reserved course.
    pub async fn select(&self, course_id: &str) -> Result<Selection, SignupError> {
        let nethz = self.session.identifier().ok_or(SignupError::NoSession)?;

        let already_chosen = self
            .selected()
            .iter()
            .map(|selection| selection.course.as_str())
            .chain(self.signups.list().iter().map(|signup| signup.course.as_str()))
            .any(|course| course == course_id);
        if already_chosen {
            return Err(SignupError::AlreadyChosen {
                course: course_id.to_string(),
            });
        }

        let candidate = self.course(course_id).await?;

        let mut conflicts = Vec::new();
        for other in self.blocking_courses() {
            let Some(course) = self.lookup_course(&other).await else {
                continue;
            };
            if overlaps(&candidate.datetimes, &course.datetimes) > 0 {
                conflicts.push(other);
            }
        }
        if !conflicts.is_empty() {
            info!(course = %course_id, conflicts = ?conflicts, "Selection rejected, time slots overlap");
            return Err(SignupError::Overlap {
                course: course_id.to_string(),
                conflicts,
            });
        }

        let selection = self
            .selections
            .create(Selection::draft(nethz, course_id))
            .await?;
        debug!(course = %course_id, "Course selected");
        Ok(selection)
    }

    /// Course ids of everything selected, waiting or reserved.
    fn blocking_courses(&self) -> Vec<String> {
        let mut courses: Vec<String> = self
            .selected()
            .into_iter()
            .map(|selection| selection.course)
            .chain(self.waiting().into_iter().map(|signup| signup.course))
            .chain(self.reserved().into_iter().map(|signup| signup.course))
            .collect();
        courses.sort();
        courses.dedup();
        courses
    }

    /// Resolves a course from the catalog, fetching it if it isn't loaded.
    async fn course(&self, course_id: &str) -> Result<Course, StoreError> {
        match self.courses.get(course_id) {
            Some(course) => Ok(course),
            None => self.courses.fetch_one(course_id).await,
        }
    }

    async fn lookup_course(&self, course_id: &str) -> Option<Course> {
        match self.course(course_id).await {
            Ok(course) => Some(course),
            Err(err) => {
                warn!(course = %course_id, error = %err, "Could not resolve course, ignoring it for overlap checks");
                None
            }
        }
    }

    /// Removes a selection. Hidden from [`selected`](Self::selected) right away.
    pub fn deselect(
        &self,
        selection_id: &str,
    ) -> impl Future<Output = Result<(), SignupError>> + Send + '_ {
        let pending = self.selections.delete(selection_id);
        async move { Ok(pending.await?) }
    }

    /// Turns every confirmed selection into a signup.
    ///
    /// Per selection: delete the selection, then create a signup for its
    /// course. If the signup can't be created the selection is re-created and
    /// the signup error returned. The steps are not atomic; if the
    /// re-creation fails as well the selection is gone and
    /// [`SignupError::CompensationFailed`] is returned. Stops at the first
    /// failing selection.
    pub async fn reserve(&self) -> Result<Vec<Signup>, SignupError> {
        let selections: Vec<(String, Selection)> = self
            .selections
            .list()
            .into_iter()
            .filter_map(|selection| Some((selection.id.clone()?, selection)))
            .collect();

        let mut signups = Vec::with_capacity(selections.len());
        for (id, selection) in selections {
            signups.push(self.reserve_one(&id, selection).await?);
        }

        info!(count = signups.len(), "Selections turned into signups");
        Ok(signups)
    }

    async fn reserve_one(&self, selection_id: &str, selection: Selection) -> Result<Signup, SignupError> {
        self.selections.delete(selection_id).await?;

        let source = match self
            .signups
            .create(Signup::draft(&selection.nethz, &selection.course))
            .await
        {
            Ok(signup) => {
                debug!(course = %selection.course, status = %signup.status, "Signed up");
                return Ok(signup);
            }
            Err(err) => err,
        };

        warn!(
            course = %selection.course,
            error = %source,
            "Signup failed, restoring selection"
        );
        match self
            .selections
            .create(Selection::draft(&selection.nethz, &selection.course))
            .await
        {
            Ok(_) => Err(source.into()),
            Err(compensation) => {
                error!(
                    course = %selection.course,
                    error = %compensation,
                    "Could not restore selection after failed signup"
                );
                Err(SignupError::CompensationFailed {
                    course: selection.course,
                    source,
                    compensation,
                })
            }
        }
    }

    /// Gives up a signup. Hidden from the signup views right away.
    pub fn free(&self, signup_id: &str) -> impl Future<Output = Result<(), SignupError>> + Send + '_ {
        let pending = self.signups.delete(signup_id);
        async move { Ok(pending.await?) }
    }

    /// Pays for all reserved signups.
    ///
    /// Opens the checkout through `provider` with `course_price` per reserved
    /// signup. With a token, the payment is confirmed against the API and the
    /// signups are reloaded. Returns `None` if the user closed the checkout.
    pub async fn pay(&self, provider: &dyn PaymentProvider) -> Result<Option<Payment>, SignupError> {
        let reserved: Vec<String> = self
            .reserved()
            .into_iter()
            .filter_map(|signup| signup.id)
            .collect();
        if reserved.is_empty() {
            return Err(SignupError::NothingToPay);
        }

        let options = PaymentOptions {
            amount: self.course_price * reserved.len() as u64,
            currency: self.currency.clone(),
            description: format!("{} PVK course(s)", reserved.len()),
        };
        info!(amount = options.amount, count = reserved.len(), "Opening checkout");

        let Some(token) = provider.open(options).await? else {
            info!("Checkout closed without payment");
            return Ok(None);
        };

        let request = ApiRequest::post("payments").with_data(json!({
            "signups": reserved,
            "token": token,
        }));
        let value = self
            .transport
            .request(request)
            .await
            .map_err(StoreError::from)?;
        let payment: Payment = serde_json::from_value(value).map_err(StoreError::from)?;

        self.signups.fetch_all().await?;
        info!(payment = ?payment.id, "Payment confirmed");
        Ok(Some(payment))
    }
}

/// A store for `name` with the configured paging.
fn configured_store<T>(
    name: &str,
    transport: &Arc<dyn Transport>,
    config: &ClientConfig,
) -> ResourceStore<T>
where
    T: Record + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    ResourceStore::new(name, transport.clone())
        .with_page_size(config.page_size)
        .with_page_concurrency(config.page_concurrency)
}
