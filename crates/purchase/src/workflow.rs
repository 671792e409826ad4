//! Purchase workflow step names, used in logs.

/// Step name: Reject purchases of the buyer's own listing.
pub const STEP_VALIDATE: &str = "validate";

/// Step name: Atomically move the listing from Active to Reserved.
pub const STEP_RESERVE: &str = "reserve_listing";

/// Step name: Compute fees and persist the Pending transaction.
pub const STEP_PERSIST_TRANSACTION: &str = "persist_transaction";

/// Step name: Request a payment invoice from the gateway.
pub const STEP_CREATE_INVOICE: &str = "create_invoice";

/// Step name: Mark the listing Sold and attach the invoice reference.
pub const STEP_FINALIZE: &str = "finalize";

/// Step name: Release the listing and fail the transaction.
pub const STEP_COMPENSATE: &str = "compensate";
