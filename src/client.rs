// Scheduling client: the operations the booking widget's HTTP layer consumes
// Inputs are plain primitives, outputs plain result objects; no HTTP concepts here.

use crate::availability::{filter_window, AvailabilityResolver};
use crate::booking::BookingOperations;
use crate::config::GatewayConfig;
use crate::durations::ServiceDurationCache;
use crate::error::{ConfigError, GatewayError};
use crate::gateway::{GatewayStatsReport, RpcGateway};
use crate::models::{BookingConfirmation, BookingDetails, NewBooking, RescheduleOutcome, Slot};
use crate::reschedule::{NoticePolicy, RescheduleWorkflow};
use crate::session::SessionManager;
use crate::transport::{HttpTransport, RpcTransport};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait SchedulingApi: Send + Sync + 'static {
    // Free slots for a service on a date. With both `from_time` and `to_time` (HH:MM)
    // only slots inside that inclusive window are returned.
    async fn get_availability(
        &self,
        service_id: u64,
        date: &str,
        provider_id: Option<u64>,
        from_time: Option<&str>,
        to_time: Option<&str>,
    ) -> Result<Vec<Slot>, GatewayError>;

    async fn create_booking(&self, booking: NewBooking)
        -> Result<BookingConfirmation, GatewayError>;

    async fn reschedule_booking(
        &self,
        booking_id: &str,
        booking_hash: &str,
        new_date: &str,
        new_time: &str,
    ) -> Result<RescheduleOutcome, GatewayError>;

    async fn get_booking_details(
        &self,
        booking_id: &str,
        booking_hash: &str,
    ) -> Result<BookingDetails, GatewayError>;

    async fn service_duration_minutes(&self, service_id: u64)
        -> Result<Option<f64>, GatewayError>;

    fn stats(&self) -> GatewayStatsReport;

    // Drop the session token and cached reference data.
    fn reset(&self);
}

pub struct SchedulerClient {
    gateway: Arc<RpcGateway>,
    durations: ServiceDurationCache,
    resolver: Arc<AvailabilityResolver>,
    bookings: Arc<BookingOperations>,
    reschedule: RescheduleWorkflow,
}

impl SchedulerClient {
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(config.base_url.clone(), config.request_timeout())
            .map_err(|e| ConfigError::InitError(e.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: GatewayConfig, transport: Arc<dyn RpcTransport>) -> Self {
        let session = Arc::new(SessionManager::new(
            Arc::clone(&transport),
            config.company.clone(),
            config.api_key.clone(),
        ));
        let gateway = Arc::new(RpcGateway::new(transport, session));
        let durations =
            ServiceDurationCache::new(Arc::clone(&gateway), config.service_duration_ttl());
        let resolver = Arc::new(AvailabilityResolver::new(Arc::clone(&gateway)));
        let bookings = Arc::new(BookingOperations::new(
            Arc::clone(&gateway),
            config.secret_key.clone(),
        ));
        let reschedule = RescheduleWorkflow::new(
            Arc::clone(&gateway),
            Arc::clone(&bookings),
            Arc::clone(&resolver),
            config.salon_timezone,
            config.utc_offset_minutes,
            NoticePolicy::new(config.min_reschedule_hours),
        );

        Self {
            gateway,
            durations,
            resolver,
            bookings,
            reschedule,
        }
    }
}

#[async_trait]
impl SchedulingApi for SchedulerClient {
    async fn get_availability(
        &self,
        service_id: u64,
        date: &str,
        provider_id: Option<u64>,
        from_time: Option<&str>,
        to_time: Option<&str>,
    ) -> Result<Vec<Slot>, GatewayError> {
        let slots = self
            .resolver
            .resolve(service_id, date, provider_id, from_time, to_time)
            .await?;
        Ok(match (from_time, to_time) {
            (Some(from), Some(to)) => filter_window(slots, from, to),
            _ => slots,
        })
    }

    async fn create_booking(
        &self,
        booking: NewBooking,
    ) -> Result<BookingConfirmation, GatewayError> {
        self.bookings.create(&booking).await
    }

    async fn reschedule_booking(
        &self,
        booking_id: &str,
        booking_hash: &str,
        new_date: &str,
        new_time: &str,
    ) -> Result<RescheduleOutcome, GatewayError> {
        self.reschedule
            .run(booking_id, booking_hash, new_date, new_time)
            .await
    }

    async fn get_booking_details(
        &self,
        booking_id: &str,
        booking_hash: &str,
    ) -> Result<BookingDetails, GatewayError> {
        self.bookings.details(booking_id, booking_hash).await
    }

    async fn service_duration_minutes(
        &self,
        service_id: u64,
    ) -> Result<Option<f64>, GatewayError> {
        self.durations.duration_for(service_id).await
    }

    fn stats(&self) -> GatewayStatsReport {
        GatewayStatsReport {
            duration_refreshes: self.durations.refresh_count(),
            ..self.gateway.stats()
        }
    }

    fn reset(&self) {
        self.gateway.session().reset();
        self.durations.invalidate();
    }
}
