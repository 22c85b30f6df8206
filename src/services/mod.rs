// Business logic services

pub mod booking_service;
pub mod email_service;
pub mod payment_gateway_service;
pub mod review_service;
pub mod session_service;
pub mod trainer_service;
pub mod verification_service;

pub use booking_service::{BookingError, BookingService};
pub use email_service::{EmailError, EmailService};
pub use payment_gateway_service::{
    GatewayConfig, PaymentError, PaymentGatewayService, PaymentIntent, WebhookEvent,
};
pub use review_service::{ReviewError, ReviewService};
pub use session_service::{SessionError, SessionService};
pub use trainer_service::{TrainerError, TrainerService};
pub use verification_service::{
    DecisionAction, DecisionOutcome, VerificationError, VerificationService,
};
